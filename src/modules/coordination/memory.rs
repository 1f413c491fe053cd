use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{CoordResult, CoordinationStore, RebuildState, WorkloadSnapshot};

#[derive(Default)]
struct CoordInner {
    /// volunteer id → open-assignment score; BTreeMap keeps ids ordered so
    /// the score tie-break falls out of a stable sort
    scores: BTreeMap<String, i64>,
    held_by: BTreeMap<String, BTreeSet<Uuid>>,
    holders: HashMap<Uuid, BTreeSet<String>>,
}

/// In-process coordination store.
///
/// A single mutex guards the whole state, which makes every operation
/// trivially atomic. The lock is never held across an await point.
#[derive(Default)]
pub struct MemoryCoordinationStore {
    inner: Mutex<CoordInner>,
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn register(&self, volunteer_id: &str) -> CoordResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.scores.contains_key(volunteer_id) {
            return Ok(false);
        }
        inner.scores.insert(volunteer_id.to_string(), 0);
        Ok(true)
    }

    async fn unregister(&self, volunteer_id: &str) -> CoordResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let existed = inner.scores.remove(volunteer_id).is_some();
        if let Some(reports) = inner.held_by.remove(volunteer_id) {
            for report_id in reports {
                if let Some(holders) = inner.holders.get_mut(&report_id) {
                    holders.remove(volunteer_id);
                    if holders.is_empty() {
                        inner.holders.remove(&report_id);
                    }
                }
            }
        }
        Ok(existed)
    }

    async fn incr_workload(&self, volunteer_id: &str) -> CoordResult<Option<i64>> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.scores.get_mut(volunteer_id).map(|score| {
            *score += 1;
            *score
        }))
    }

    async fn decr_workload(&self, volunteer_id: &str) -> CoordResult<Option<i64>> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.scores.get_mut(volunteer_id).map(|score| {
            *score = (*score - 1).max(0);
            *score
        }))
    }

    async fn workload(&self, volunteer_id: &str) -> CoordResult<Option<i64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.scores.get(volunteer_id).copied())
    }

    async fn least_loaded(&self, k: usize) -> CoordResult<Vec<(String, i64)>> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<(String, i64)> = inner
            .scores
            .iter()
            .map(|(id, score)| (id.clone(), *score))
            .collect();
        // Stable sort over id-ordered entries: ties stay in id order
        entries.sort_by_key(|(_, score)| *score);
        entries.truncate(k);
        Ok(entries)
    }

    async fn add_held(&self, volunteer_id: &str, report_id: Uuid) -> CoordResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .held_by
            .entry(volunteer_id.to_string())
            .or_default()
            .insert(report_id);
        inner
            .holders
            .entry(report_id)
            .or_default()
            .insert(volunteer_id.to_string());
        Ok(())
    }

    async fn remove_held(&self, volunteer_id: &str, report_id: Uuid) -> CoordResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(reports) = inner.held_by.get_mut(volunteer_id) {
            reports.remove(&report_id);
            if reports.is_empty() {
                inner.held_by.remove(volunteer_id);
            }
        }
        if let Some(holders) = inner.holders.get_mut(&report_id) {
            holders.remove(volunteer_id);
            if holders.is_empty() {
                inner.holders.remove(&report_id);
            }
        }
        Ok(())
    }

    async fn reports_held_by(&self, volunteer_id: &str) -> CoordResult<Vec<Uuid>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .held_by
            .get(volunteer_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn volunteers_holding(&self, report_id: Uuid) -> CoordResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .holders
            .get(&report_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn snapshot(&self) -> CoordResult<WorkloadSnapshot> {
        let inner = self.inner.lock().unwrap();
        Ok(WorkloadSnapshot {
            scores: inner.scores.clone(),
            held: inner
                .held_by
                .iter()
                .map(|(id, reports)| (id.clone(), reports.iter().copied().collect()))
                .collect(),
        })
    }

    async fn rebuild(&self, state: RebuildState) -> CoordResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.scores = state.scores;
        inner.holders.clear();
        for (volunteer_id, reports) in &state.held {
            for report_id in reports {
                inner
                    .holders
                    .entry(*report_id)
                    .or_default()
                    .insert(volunteer_id.clone());
            }
        }
        inner.held_by = state.held;
        Ok(())
    }
}
