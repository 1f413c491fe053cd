use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::core::error::Result;
use crate::features::assignments::services::AssignmentManager;
use crate::features::realtime::{Fanout, PushEvent};
use crate::modules::coordination::{CoordinationStore, RebuildState};
use crate::modules::storage::DurableStore;

/// A deviation between the durable store and derived state
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// Report left pending but some assignments are still open
    ResolvedReportWithOpenAssignments { report_id: Uuid, open: usize },
    /// Report has a verification on record but is still pending
    PendingReportWithVerification {
        report_id: Uuid,
        volunteer_id: String,
    },
    /// Cached workload score differs from the durable open-assignment count
    WorkloadDrift {
        volunteer_id: String,
        durable: i64,
        cached: i64,
    },
    /// Cached held-report set differs from durable open assignments
    HeldDrift {
        volunteer_id: String,
        missing: Vec<Uuid>,
        extra: Vec<Uuid>,
    },
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct RepairSummary {
    /// Reports resolved by applying their earliest recorded verification
    pub resolved_reports: usize,
    /// Open assignments expired on already-resolved reports
    pub expired_assignments: usize,
    /// Whether the coordination cache was rebuilt from durable facts
    pub cache_rebuilt: bool,
}

/// Detects and corrects drift between the durable store and the derived
/// coordination state.
///
/// Both passes are idempotent: a second run immediately after a repair
/// finds nothing to do. The durable store always wins; the cache is
/// rebuilt, never trusted.
pub struct ReconciliationService {
    store: Arc<dyn DurableStore>,
    coord: Arc<dyn CoordinationStore>,
    manager: Arc<AssignmentManager>,
    fanout: Arc<Fanout>,
}

impl ReconciliationService {
    pub fn new(
        store: Arc<dyn DurableStore>,
        coord: Arc<dyn CoordinationStore>,
        manager: Arc<AssignmentManager>,
        fanout: Arc<Fanout>,
    ) -> Self {
        Self {
            store,
            coord,
            manager,
            fanout,
        }
    }

    /// Read-only pass listing every discrepancy without changing anything
    pub async fn verify(&self) -> Result<Vec<Discrepancy>> {
        let mut found = Vec::new();

        for report_id in self.store.resolved_reports_with_open_assignments().await? {
            let open = self.store.open_assignments_for_report(report_id).await?;
            found.push(Discrepancy::ResolvedReportWithOpenAssignments {
                report_id,
                open: open.len(),
            });
        }

        for verification in self.store.pending_reports_with_earliest_verification().await? {
            found.push(Discrepancy::PendingReportWithVerification {
                report_id: verification.report_id,
                volunteer_id: verification.volunteer_id,
            });
        }

        let durable_counts = self.store.open_assignment_counts().await?;
        let durable_held = self.store.open_reports_by_volunteer().await?;
        let snapshot = self.coord.snapshot().await?;

        let ids: BTreeSet<&String> = snapshot.scores.keys().chain(durable_counts.keys()).collect();
        for id in ids {
            let durable = durable_counts.get(id).copied().unwrap_or(0);
            let cached = snapshot.scores.get(id).copied().unwrap_or(0);
            if durable != cached {
                found.push(Discrepancy::WorkloadDrift {
                    volunteer_id: id.clone(),
                    durable,
                    cached,
                });
            }

            let want = durable_held.get(id).cloned().unwrap_or_default();
            let have: BTreeSet<Uuid> = snapshot
                .held
                .get(id)
                .map(|v| v.iter().copied().collect())
                .unwrap_or_default();
            if want != have {
                found.push(Discrepancy::HeldDrift {
                    volunteer_id: id.clone(),
                    missing: want.difference(&have).copied().collect(),
                    extra: have.difference(&want).copied().collect(),
                });
            }
        }

        Ok(found)
    }

    /// Corrective pass: durable fixes first, then a full cache rebuild.
    ///
    /// Stuck verifications are applied before leaked assignments are
    /// expired, since applying one also expires that report's siblings.
    pub async fn repair(&self) -> Result<RepairSummary> {
        let mut summary = RepairSummary::default();

        for verification in self.store.pending_reports_with_earliest_verification().await? {
            let outcome = self
                .store
                .resolve_if_pending(
                    verification.report_id,
                    &verification.volunteer_id,
                    verification.decision,
                    verification.note.as_deref(),
                )
                .await?;
            if !outcome.applied {
                continue;
            }
            summary.resolved_reports += 1;
            if let Some(report) = self.store.get_report(verification.report_id).await? {
                for assignment in &outcome.released {
                    self.manager.release(assignment).await;
                    self.fanout
                        .push(&assignment.volunteer_id, &PushEvent::report_resolved(&report));
                }
            }
            tracing::info!(
                report_id = %verification.report_id,
                volunteer_id = %verification.volunteer_id,
                "Applied recorded verification to stuck report"
            );
        }

        for report_id in self.store.resolved_reports_with_open_assignments().await? {
            let expired = self.store.expire_open_assignments(report_id).await?;
            summary.expired_assignments += expired.len();
            for assignment in &expired {
                self.manager.release(assignment).await;
            }
            tracing::info!(
                report_id = %report_id,
                expired = expired.len(),
                "Expired leaked assignments on resolved report"
            );
        }

        // Rebuild the cache from durable facts so any remaining score or
        // held drift disappears in one swap
        let mut state = RebuildState::default();
        for id in self.store.volunteer_ids().await? {
            state.scores.insert(id, 0);
        }
        for (id, count) in self.store.open_assignment_counts().await? {
            if state.scores.contains_key(&id) {
                state.scores.insert(id.clone(), count);
            }
        }
        for (id, reports) in self.store.open_reports_by_volunteer().await? {
            if state.scores.contains_key(&id) {
                state.held.insert(id, reports);
            }
        }
        self.coord.rebuild(state).await?;
        summary.cache_rebuilt = true;

        tracing::info!(
            resolved = summary.resolved_reports,
            expired = summary.expired_assignments,
            "Reconciliation repair complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::reports::models::{CreateReport, ReportStatus};
    use crate::features::verifications::models::{Decision, NewVerification};
    use crate::modules::coordination::MemoryCoordinationStore;
    use crate::modules::storage::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        coord: Arc<MemoryCoordinationStore>,
        manager: Arc<AssignmentManager>,
        service: ReconciliationService,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let coord = Arc::new(MemoryCoordinationStore::new());
        let fanout = Arc::new(Fanout::new(16));
        let manager = Arc::new(AssignmentManager::new(
            store.clone(),
            coord.clone(),
            fanout.clone(),
            2,
        ));
        let service =
            ReconciliationService::new(store.clone(), coord.clone(), manager.clone(), fanout);
        Harness {
            store,
            coord,
            manager,
            service,
        }
    }

    fn report_data() -> CreateReport {
        CreateReport {
            reporter_id: "rep-1".to_string(),
            category: "illegal-dumping".to_string(),
            lat: -7.25,
            lng: 112.75,
            image_url: "https://img.example/1.jpg".to_string(),
            image_hash: None,
            priority: 0,
        }
    }

    #[tokio::test]
    async fn clean_state_verifies_empty() {
        let h = harness();
        h.manager.register_volunteer("vol-a").await.unwrap();
        let report = h.store.insert_report(&report_data()).await.unwrap();
        h.manager.dispatch(&report).await.unwrap();

        assert!(h.service.verify().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stuck_verification_is_applied_by_repair() {
        let h = harness();
        h.manager.register_volunteer("vol-a").await.unwrap();
        h.manager.register_volunteer("vol-b").await.unwrap();
        let report = h.store.insert_report(&report_data()).await.unwrap();
        h.manager.dispatch(&report).await.unwrap();

        // Crash between recording the verification and resolving
        h.store
            .insert_verification(&NewVerification {
                report_id: report.id,
                volunteer_id: "vol-a".to_string(),
                decision: Decision::Verified,
                note: None,
            })
            .await
            .unwrap();

        let found = h.service.verify().await.unwrap();
        assert!(found.iter().any(|d| matches!(
            d,
            Discrepancy::PendingReportWithVerification { report_id, .. } if *report_id == report.id
        )));

        let summary = h.service.repair().await.unwrap();
        assert_eq!(summary.resolved_reports, 1);

        let resolved = h.store.get_report(report.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, ReportStatus::Verified);
        assert_eq!(resolved.verified_by.as_deref(), Some("vol-a"));
        assert!(h
            .store
            .open_assignments_for_report(report.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn leaked_assignment_on_resolved_report_is_expired() {
        let h = harness();
        h.manager.register_volunteer("vol-a").await.unwrap();
        let report = h.store.insert_report(&report_data()).await.unwrap();
        h.manager.dispatch(&report).await.unwrap();
        h.store
            .insert_verification(&NewVerification {
                report_id: report.id,
                volunteer_id: "vol-a".to_string(),
                decision: Decision::Rejected,
                note: None,
            })
            .await
            .unwrap();
        h.store
            .resolve_if_pending(report.id, "vol-a", Decision::Rejected, None)
            .await
            .unwrap();
        // Assignment written after resolution, e.g. by a dispatch that lost
        // a race with the resolver
        h.store.insert_assignment(report.id, "vol-a").await.unwrap();

        let found = h.service.verify().await.unwrap();
        assert!(found.iter().any(|d| matches!(
            d,
            Discrepancy::ResolvedReportWithOpenAssignments { report_id, .. } if *report_id == report.id
        )));

        let summary = h.service.repair().await.unwrap();
        assert_eq!(summary.expired_assignments, 1);
        assert!(h
            .store
            .open_assignments_for_report(report.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn workload_drift_is_rebuilt_from_durable_counts() {
        let h = harness();
        h.manager.register_volunteer("vol-a").await.unwrap();
        let report = h.store.insert_report(&report_data()).await.unwrap();
        h.manager.dispatch(&report).await.unwrap();

        // Cache drifts ahead of the durable count
        h.coord.incr_workload("vol-a").await.unwrap();
        h.coord.incr_workload("vol-a").await.unwrap();

        let found = h.service.verify().await.unwrap();
        assert!(found.iter().any(|d| matches!(
            d,
            Discrepancy::WorkloadDrift { volunteer_id, durable: 1, cached: 3 }
                if volunteer_id == "vol-a"
        )));

        h.service.repair().await.unwrap();
        assert_eq!(h.coord.workload("vol-a").await.unwrap(), Some(1));
        assert!(h.service.verify().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repair_is_idempotent() {
        let h = harness();
        h.manager.register_volunteer("vol-a").await.unwrap();
        let report = h.store.insert_report(&report_data()).await.unwrap();
        h.manager.dispatch(&report).await.unwrap();
        h.store
            .insert_verification(&NewVerification {
                report_id: report.id,
                volunteer_id: "vol-a".to_string(),
                decision: Decision::Verified,
                note: None,
            })
            .await
            .unwrap();

        let first = h.service.repair().await.unwrap();
        assert_eq!(first.resolved_reports, 1);

        let second = h.service.repair().await.unwrap();
        assert_eq!(second.resolved_reports, 0);
        assert_eq!(second.expired_assignments, 0);
        assert!(h.service.verify().await.unwrap().is_empty());
    }
}
