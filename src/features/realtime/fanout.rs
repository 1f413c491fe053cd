use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::events::PushEvent;

/// Opaque handle for one registered push connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    volunteer_id: String,
    conn_id: u64,
}

/// Per-volunteer registry of open push connections.
///
/// A volunteer may hold several connections at once (multiple open
/// sessions). Push is best-effort and never blocks: events are cloned into
/// each connection's buffered channel with `try_send`; a closed receiver
/// gets its connection pruned, a full buffer drops the event. Per-connection
/// ordering follows from the mpsc channel.
pub struct Fanout {
    connections: Mutex<HashMap<String, HashMap<u64, mpsc::Sender<PushEvent>>>>,
    next_conn_id: AtomicU64,
    buffer: usize,
}

impl Fanout {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a new connection for a volunteer, returning its handle and
    /// the receiving end to drain into the transport
    pub fn add_connection(&self, volunteer_id: &str) -> (ConnectionHandle, mpsc::Receiver<PushEvent>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);

        let mut connections = self.connections.lock().unwrap();
        connections
            .entry(volunteer_id.to_string())
            .or_default()
            .insert(conn_id, tx);

        tracing::debug!(
            "Push connection {} opened for volunteer {}",
            conn_id,
            volunteer_id
        );

        (
            ConnectionHandle {
                volunteer_id: volunteer_id.to_string(),
                conn_id,
            },
            rx,
        )
    }

    /// Deregister a connection. Safe to call multiple times; removing an
    /// already-removed handle is a no-op.
    pub fn remove_connection(&self, handle: &ConnectionHandle) {
        let mut connections = self.connections.lock().unwrap();
        if let Some(conns) = connections.get_mut(&handle.volunteer_id) {
            if conns.remove(&handle.conn_id).is_some() {
                tracing::debug!(
                    "Push connection {} closed for volunteer {}",
                    handle.conn_id,
                    handle.volunteer_id
                );
            }
            if conns.is_empty() {
                connections.remove(&handle.volunteer_id);
            }
        }
    }

    /// Deliver an event to every open connection of a volunteer.
    /// Failures are swallowed; dead connections are pruned on the spot.
    pub fn push(&self, volunteer_id: &str, event: &PushEvent) {
        let mut connections = self.connections.lock().unwrap();
        let Some(conns) = connections.get_mut(volunteer_id) else {
            return;
        };

        let mut dead = Vec::new();
        for (conn_id, tx) in conns.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*conn_id),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Slow consumer: drop the event, the client reconciles
                    // by polling
                    tracing::debug!(
                        "Push buffer full for volunteer {} connection {}, dropping {}",
                        volunteer_id,
                        conn_id,
                        event.kind()
                    );
                }
            }
        }

        for conn_id in dead {
            conns.remove(&conn_id);
            tracing::debug!(
                "Pruned dead push connection {} for volunteer {}",
                conn_id,
                volunteer_id
            );
        }
        if conns.is_empty() {
            connections.remove(volunteer_id);
        }
    }

    pub fn connection_count(&self, volunteer_id: &str) -> usize {
        let connections = self.connections.lock().unwrap();
        connections.get(volunteer_id).map(|c| c.len()).unwrap_or(0)
    }
}

/// Removes its connection exactly once when dropped, covering both
/// client-initiated and server-initiated disconnects
pub struct ConnectionGuard {
    fanout: Arc<Fanout>,
    handle: ConnectionHandle,
}

impl ConnectionGuard {
    pub fn new(fanout: Arc<Fanout>, handle: ConnectionHandle) -> Self {
        Self { fanout, handle }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.fanout.remove_connection(&self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn expired_event() -> PushEvent {
        PushEvent::AssignmentExpired {
            assignment_id: Uuid::new_v4(),
            report_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn push_reaches_all_connections_in_order() {
        let fanout = Fanout::new(8);
        let (_h1, mut rx1) = fanout.add_connection("vol-a");
        let (_h2, mut rx2) = fanout.add_connection("vol-a");

        let first = expired_event();
        let second = expired_event();
        fanout.push("vol-a", &first);
        fanout.push("vol-a", &second);

        for rx in [&mut rx1, &mut rx2] {
            let got_first = rx.recv().await.unwrap();
            let got_second = rx.recv().await.unwrap();
            assert_eq!(got_first.kind(), "assignment.expired");
            match (&first, &got_first, &second, &got_second) {
                (
                    PushEvent::AssignmentExpired { assignment_id: a, .. },
                    PushEvent::AssignmentExpired { assignment_id: b, .. },
                    PushEvent::AssignmentExpired { assignment_id: c, .. },
                    PushEvent::AssignmentExpired { assignment_id: d, .. },
                ) => {
                    assert_eq!(a, b);
                    assert_eq!(c, d);
                }
                _ => panic!("unexpected event shape"),
            }
        }
    }

    #[tokio::test]
    async fn push_to_other_volunteer_is_isolated() {
        let fanout = Fanout::new(8);
        let (_h, mut rx) = fanout.add_connection("vol-a");

        fanout.push("vol-b", &expired_event());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn remove_connection_is_idempotent() {
        let fanout = Fanout::new(8);
        let (handle, _rx) = fanout.add_connection("vol-a");

        fanout.remove_connection(&handle);
        fanout.remove_connection(&handle);
        assert_eq!(fanout.connection_count("vol-a"), 0);
    }

    #[tokio::test]
    async fn dead_connections_are_pruned_on_push() {
        let fanout = Fanout::new(8);
        let (_handle, rx) = fanout.add_connection("vol-a");
        drop(rx);

        assert_eq!(fanout.connection_count("vol-a"), 1);
        fanout.push("vol-a", &expired_event());
        assert_eq!(fanout.connection_count("vol-a"), 0);
    }

    #[tokio::test]
    async fn full_buffer_drops_event_but_keeps_connection() {
        let fanout = Fanout::new(1);
        let (_handle, mut rx) = fanout.add_connection("vol-a");

        fanout.push("vol-a", &expired_event());
        fanout.push("vol-a", &expired_event());

        assert_eq!(fanout.connection_count("vol-a"), 1);
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn guard_runs_cleanup_once_on_drop() {
        let fanout = Arc::new(Fanout::new(8));
        let (handle, _rx) = fanout.add_connection("vol-a");

        let guard = ConnectionGuard::new(Arc::clone(&fanout), handle);
        assert_eq!(fanout.connection_count("vol-a"), 1);
        drop(guard);
        assert_eq!(fanout.connection_count("vol-a"), 0);
    }
}
