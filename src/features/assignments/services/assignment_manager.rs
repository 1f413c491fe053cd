use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::core::error::Result;
use crate::features::admin::models::User;
use crate::features::assignments::models::{Assignment, AssignmentStatus};
use crate::features::realtime::{Fanout, PushEvent};
use crate::features::reports::models::Report;
use crate::modules::coordination::CoordinationStore;
use crate::modules::storage::DurableStore;
use crate::shared::constants::{ROLE_REPORTER, ROLE_VOLUNTEER};

/// Workload-aware fanout of reports to volunteers.
///
/// Selection normally goes through the coordination store (k least-loaded,
/// ties by id). When that store is unavailable, dispatch degrades to a
/// round-robin over the locally known roster so report intake never stalls;
/// the skipped workload accounting is restored by the next reconciliation.
pub struct AssignmentManager {
    store: Arc<dyn DurableStore>,
    coord: Arc<dyn CoordinationStore>,
    fanout: Arc<Fanout>,
    fanout_k: usize,
    /// Registered volunteer ids, kept for degraded-mode selection
    roster: RwLock<BTreeSet<String>>,
    /// Round-robin cursor for degraded-mode selection
    cursor: AtomicUsize,
}

impl AssignmentManager {
    pub fn new(
        store: Arc<dyn DurableStore>,
        coord: Arc<dyn CoordinationStore>,
        fanout: Arc<Fanout>,
        fanout_k: usize,
    ) -> Self {
        Self {
            store,
            coord,
            fanout,
            fanout_k,
            roster: RwLock::new(BTreeSet::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Enroll a user as a volunteer: durable role first, then the
    /// coordination score. Idempotent. A failed coordination sync is
    /// logged and left to reconciliation; it never blocks the role change.
    pub async fn register_volunteer(&self, user_id: &str) -> Result<User> {
        let user = self.store.upsert_user_role(user_id, ROLE_VOLUNTEER).await?;
        if let Err(e) = self.coord.register(user_id).await {
            tracing::warn!(
                user_id = %user_id,
                "Registration sync to coordination store failed: {}",
                e
            );
        }
        self.roster
            .write()
            .expect("roster lock poisoned")
            .insert(user_id.to_string());
        Ok(user)
    }

    /// Demote a volunteer and remove them from dispatch consideration.
    /// Existing durable assignments are untouched; the cleared score cannot
    /// be resurrected by a racing dispatch. As with registration, the
    /// coordination-side cleanup is best-effort.
    pub async fn unregister_volunteer(&self, user_id: &str) -> Result<bool> {
        self.store.upsert_user_role(user_id, ROLE_REPORTER).await?;
        let cleared = match self.coord.unregister(user_id).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    "Unregistration sync to coordination store failed: {}",
                    e
                );
                false
            }
        };
        let in_roster = self
            .roster
            .write()
            .expect("roster lock poisoned")
            .remove(user_id);
        Ok(cleared || in_roster)
    }

    /// Seed the coordination store and local roster from the durable user
    /// table. Called at startup, before the first dispatch.
    pub async fn sync_roster(&self) -> Result<()> {
        let ids = self.store.volunteer_ids().await?;
        for id in &ids {
            self.coord.register(id).await?;
        }
        let mut roster = self.roster.write().expect("roster lock poisoned");
        roster.clear();
        roster.extend(ids);
        Ok(())
    }

    /// Fan a report out to up to `fanout_k` volunteers.
    ///
    /// Each assignment insert stands alone: a failure for one candidate is
    /// compensated (workload decremented) and the loop moves on, so earlier
    /// assignments are never rolled back. Returns the assignments that were
    /// durably created.
    pub async fn dispatch(&self, report: &Report) -> Result<Vec<Assignment>> {
        let (candidates, degraded) = match self.coord.least_loaded(self.fanout_k).await {
            Ok(ranked) => (ranked.into_iter().map(|(id, _)| id).collect(), false),
            Err(e) => {
                tracing::warn!(
                    report_id = %report.id,
                    "Least-loaded selection unavailable, falling back to round-robin: {}",
                    e
                );
                (self.fallback_candidates(), true)
            }
        };

        if candidates.is_empty() {
            tracing::warn!(report_id = %report.id, "No volunteers available for dispatch");
            return Ok(Vec::new());
        }

        let mut created = Vec::new();
        for volunteer_id in candidates {
            if !degraded {
                match self.coord.incr_workload(&volunteer_id).await {
                    Ok(Some(_)) => {}
                    // Unregistered between selection and claim; skip
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(
                            volunteer_id = %volunteer_id,
                            "Workload increment failed, continuing without it: {}",
                            e
                        );
                    }
                }
            }

            match self.store.insert_assignment(report.id, &volunteer_id).await {
                Ok(assignment) => {
                    if !degraded {
                        if let Err(e) = self.coord.add_held(&volunteer_id, report.id).await {
                            tracing::warn!(
                                volunteer_id = %volunteer_id,
                                "Failed to record held report: {}",
                                e
                            );
                        }
                    }
                    if let Err(e) = self.store.add_assigned_count(report.id, 1).await {
                        tracing::warn!(report_id = %report.id, "Failed to bump assigned count: {}", e);
                    }
                    self.fanout
                        .push(&volunteer_id, &PushEvent::assignment_created(report, &assignment));
                    created.push(assignment);
                }
                Err(e) => {
                    if !degraded {
                        if let Err(ce) = self.coord.decr_workload(&volunteer_id).await {
                            tracing::warn!(
                                volunteer_id = %volunteer_id,
                                "Compensating workload decrement failed: {}",
                                ce
                            );
                        }
                    }
                    tracing::warn!(
                        report_id = %report.id,
                        volunteer_id = %volunteer_id,
                        "Assignment insert failed, candidate skipped: {}",
                        e
                    );
                }
            }
        }

        tracing::info!(
            report_id = %report.id,
            assigned = created.len(),
            "Dispatched report"
        );
        Ok(created)
    }

    /// Transition an assignment pending → viewed for the acting volunteer
    pub async fn mark_viewed(&self, assignment_id: Uuid, volunteer_id: &str) -> Result<Assignment> {
        self.store
            .mark_assignment_viewed(assignment_id, volunteer_id)
            .await
    }

    /// Open assignments of the acting volunteer
    pub async fn list_open(&self, volunteer_id: &str) -> Result<Vec<Assignment>> {
        self.store.open_assignments_for_volunteer(volunteer_id).await
    }

    /// Open assignments on a report, for admin diagnostics
    pub async fn open_for_report(&self, report_id: Uuid) -> Result<Vec<Assignment>> {
        self.store.open_assignments_for_report(report_id).await
    }

    /// Drop the coordination-side accounting for an assignment that left
    /// the open states, and notify the volunteer when it expired under them.
    /// Coordination failures are logged, not propagated; reconciliation
    /// restores the derived state later.
    pub async fn release(&self, assignment: &Assignment) {
        if let Err(e) = self.coord.decr_workload(&assignment.volunteer_id).await {
            tracing::warn!(
                volunteer_id = %assignment.volunteer_id,
                "Workload decrement failed during release: {}",
                e
            );
        }
        if let Err(e) = self
            .coord
            .remove_held(&assignment.volunteer_id, assignment.report_id)
            .await
        {
            tracing::warn!(
                volunteer_id = %assignment.volunteer_id,
                "Held-report removal failed during release: {}",
                e
            );
        }
        if assignment.status == AssignmentStatus::Expired {
            self.fanout.push(
                &assignment.volunteer_id,
                &PushEvent::assignment_expired(assignment),
            );
        }
    }

    fn fallback_candidates(&self) -> Vec<String> {
        let roster = self.roster.read().expect("roster lock poisoned");
        if roster.is_empty() {
            return Vec::new();
        }
        let ids: Vec<&String> = roster.iter().collect();
        let take = self.fanout_k.min(ids.len());
        let start = self.cursor.fetch_add(take, Ordering::Relaxed) % ids.len();
        (0..take)
            .map(|i| ids[(start + i) % ids.len()].clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use async_trait::async_trait;

    use super::*;
    use crate::core::error::AppError;
    use crate::modules::coordination::{
        CoordError, CoordResult, MemoryCoordinationStore, RebuildState, WorkloadSnapshot,
    };
    use crate::modules::storage::MemoryStore;
    use crate::features::reports::models::CreateReport;

    fn new_report_data(reporter: &str) -> CreateReport {
        CreateReport {
            reporter_id: reporter.to_string(),
            category: "illegal-dumping".to_string(),
            lat: -7.25,
            lng: 112.75,
            image_url: "https://img.example/1.jpg".to_string(),
            image_hash: None,
            priority: 0,
        }
    }

    fn manager_with(
        store: Arc<MemoryStore>,
        coord: Arc<dyn CoordinationStore>,
        k: usize,
    ) -> AssignmentManager {
        AssignmentManager::new(store, coord, Arc::new(Fanout::new(16)), k)
    }

    /// Coordination store that is always down
    struct DownCoordination;

    #[async_trait]
    impl CoordinationStore for DownCoordination {
        async fn register(&self, _: &str) -> CoordResult<bool> {
            Err(CoordError::Unavailable("down".into()))
        }
        async fn unregister(&self, _: &str) -> CoordResult<bool> {
            Err(CoordError::Unavailable("down".into()))
        }
        async fn incr_workload(&self, _: &str) -> CoordResult<Option<i64>> {
            Err(CoordError::Unavailable("down".into()))
        }
        async fn decr_workload(&self, _: &str) -> CoordResult<Option<i64>> {
            Err(CoordError::Unavailable("down".into()))
        }
        async fn workload(&self, _: &str) -> CoordResult<Option<i64>> {
            Err(CoordError::Unavailable("down".into()))
        }
        async fn least_loaded(&self, _: usize) -> CoordResult<Vec<(String, i64)>> {
            Err(CoordError::Unavailable("down".into()))
        }
        async fn add_held(&self, _: &str, _: Uuid) -> CoordResult<()> {
            Err(CoordError::Unavailable("down".into()))
        }
        async fn remove_held(&self, _: &str, _: Uuid) -> CoordResult<()> {
            Err(CoordError::Unavailable("down".into()))
        }
        async fn reports_held_by(&self, _: &str) -> CoordResult<Vec<Uuid>> {
            Err(CoordError::Unavailable("down".into()))
        }
        async fn volunteers_holding(&self, _: Uuid) -> CoordResult<Vec<String>> {
            Err(CoordError::Unavailable("down".into()))
        }
        async fn snapshot(&self) -> CoordResult<WorkloadSnapshot> {
            Err(CoordError::Unavailable("down".into()))
        }
        async fn rebuild(&self, _: RebuildState) -> CoordResult<()> {
            Err(CoordError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn dispatch_picks_least_loaded_with_id_tie_break() {
        let store = Arc::new(MemoryStore::new());
        let coord = Arc::new(MemoryCoordinationStore::new());
        let manager = manager_with(store.clone(), coord.clone(), 2);

        for id in ["vol-a", "vol-b", "vol-c", "vol-d"] {
            manager.register_volunteer(id).await.unwrap();
        }
        // vol-d carries prior load, vol-a and vol-b tie with vol-c at 0
        for _ in 0..3 {
            coord.incr_workload("vol-d").await.unwrap();
        }

        let report = store.insert_report(&new_report_data("rep-1")).await.unwrap();
        let created = manager.dispatch(&report).await.unwrap();

        let mut picked: Vec<String> = created.into_iter().map(|a| a.volunteer_id).collect();
        picked.sort();
        assert_eq!(picked, vec!["vol-a".to_string(), "vol-b".to_string()]);

        assert_eq!(coord.workload("vol-a").await.unwrap(), Some(1));
        assert_eq!(coord.workload("vol-b").await.unwrap(), Some(1));
        assert_eq!(coord.workload("vol-c").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn unregistered_volunteer_is_never_dispatched_to() {
        let store = Arc::new(MemoryStore::new());
        let coord = Arc::new(MemoryCoordinationStore::new());
        let manager = manager_with(store.clone(), coord.clone(), 3);

        manager.register_volunteer("vol-a").await.unwrap();
        manager.register_volunteer("vol-b").await.unwrap();
        manager.unregister_volunteer("vol-a").await.unwrap();

        let report = store.insert_report(&new_report_data("rep-1")).await.unwrap();
        let created = manager.dispatch(&report).await.unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].volunteer_id, "vol-b");
    }

    #[tokio::test]
    async fn release_undoes_dispatch_workload() {
        let store = Arc::new(MemoryStore::new());
        let coord = Arc::new(MemoryCoordinationStore::new());
        let manager = manager_with(store.clone(), coord.clone(), 1);

        manager.register_volunteer("vol-a").await.unwrap();
        let report = store.insert_report(&new_report_data("rep-1")).await.unwrap();
        let created = manager.dispatch(&report).await.unwrap();
        assert_eq!(coord.workload("vol-a").await.unwrap(), Some(1));

        manager.release(&created[0]).await;
        assert_eq!(coord.workload("vol-a").await.unwrap(), Some(0));
        assert!(coord.reports_held_by("vol-a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_insert_compensates_the_workload_increment() {
        let store = Arc::new(MemoryStore::new());
        let coord = Arc::new(MemoryCoordinationStore::new());
        let manager = manager_with(store.clone(), coord.clone(), 1);

        manager.register_volunteer("vol-a").await.unwrap();
        let report = store.insert_report(&new_report_data("rep-1")).await.unwrap();
        let first = manager.dispatch(&report).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(coord.workload("vol-a").await.unwrap(), Some(1));

        // vol-a already holds an open claim on this report, so the insert
        // conflicts and the increment must be rolled back
        let second = manager.dispatch(&report).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(coord.workload("vol-a").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn dispatch_falls_back_to_roster_when_coordination_down() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone(), Arc::new(DownCoordination), 2);
        // Registration still succeeds while the coordination store is down;
        // only the score sync is skipped
        for id in ["vol-a", "vol-b", "vol-c"] {
            manager.register_volunteer(id).await.unwrap();
        }

        let report = store.insert_report(&new_report_data("rep-1")).await.unwrap();
        let created = manager.dispatch(&report).await.unwrap();
        assert_eq!(created.len(), 2);

        // A second dispatch keeps rotating through the roster
        let report2 = store.insert_report(&new_report_data("rep-2")).await.unwrap();
        let created2 = manager.dispatch(&report2).await.unwrap();
        assert_eq!(created2.len(), 2);

        let all: BTreeSet<String> = created
            .iter()
            .chain(created2.iter())
            .map(|a| a.volunteer_id.clone())
            .collect();
        assert_eq!(all.len(), 3, "round-robin should reach the whole roster");
    }

    #[tokio::test]
    async fn mark_viewed_twice_is_an_invalid_transition() {
        let store = Arc::new(MemoryStore::new());
        let coord = Arc::new(MemoryCoordinationStore::new());
        let manager = manager_with(store.clone(), coord, 1);

        manager.register_volunteer("vol-a").await.unwrap();
        let report = store.insert_report(&new_report_data("rep-1")).await.unwrap();
        let created = manager.dispatch(&report).await.unwrap();
        let assignment = &created[0];

        let viewed = manager.mark_viewed(assignment.id, "vol-a").await.unwrap();
        assert_eq!(viewed.status, AssignmentStatus::Viewed);

        let err = manager.mark_viewed(assignment.id, "vol-a").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn unregister_demotes_the_durable_role() {
        let store = Arc::new(MemoryStore::new());
        let coord = Arc::new(MemoryCoordinationStore::new());
        let manager = manager_with(store.clone(), coord.clone(), 2);

        manager.register_volunteer("vol-a").await.unwrap();
        assert!(manager.unregister_volunteer("vol-a").await.unwrap());
        assert!(store.volunteer_ids().await.unwrap().is_empty());

        // A fresh roster sync no longer resurrects the demoted user
        manager.sync_roster().await.unwrap();
        let report = store.insert_report(&new_report_data("rep-1")).await.unwrap();
        assert!(manager.dispatch(&report).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_roster_registers_durable_volunteers() {
        let store = Arc::new(MemoryStore::new());
        let coord = Arc::new(MemoryCoordinationStore::new());
        store.upsert_user_role("vol-a", ROLE_VOLUNTEER).await.unwrap();
        store.upsert_user_role("rep-1", "reporter").await.unwrap();

        let manager = manager_with(store.clone(), coord.clone(), 2);
        manager.sync_roster().await.unwrap();

        let snap = coord.snapshot().await.unwrap();
        assert_eq!(
            snap.scores,
            BTreeMap::from([("vol-a".to_string(), 0)])
        );
    }
}
