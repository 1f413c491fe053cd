use std::sync::Arc;

use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::assignments::services::AssignmentManager;
use crate::features::realtime::{Fanout, PushEvent};
use crate::features::reports::models::Report;
use crate::features::verifications::models::{Decision, NewVerification, Verification};
use crate::modules::storage::DurableStore;

/// How a submission landed
#[derive(Debug)]
pub enum SubmitOutcome {
    /// This verification resolved the report
    Resolved {
        report: Report,
        verification: Verification,
    },
    /// Another verification had already resolved it; the submitted record
    /// was still written for audit unless the report was long settled
    AlreadyResolved { report: Report },
}

/// First-commit-wins resolution of reports from volunteer verifications.
///
/// The winner is decided by the conditional update inside
/// [`DurableStore::resolve_if_pending`], never by comparing timestamps.
/// Losing submissions are not errors; callers get back the report as the
/// winner left it.
pub struct VerificationResolver {
    store: Arc<dyn DurableStore>,
    manager: Arc<AssignmentManager>,
    fanout: Arc<Fanout>,
}

impl VerificationResolver {
    pub fn new(
        store: Arc<dyn DurableStore>,
        manager: Arc<AssignmentManager>,
        fanout: Arc<Fanout>,
    ) -> Self {
        Self {
            store,
            manager,
            fanout,
        }
    }

    pub async fn submit(
        &self,
        report_id: Uuid,
        volunteer_id: &str,
        decision: Decision,
        note: Option<String>,
    ) -> Result<SubmitOutcome> {
        let report = self
            .store
            .get_report(report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Report {} not found", report_id)))?;

        if !report.status.is_pending() {
            // Settled before this volunteer acted; nothing to write
            return Ok(SubmitOutcome::AlreadyResolved { report });
        }

        let open = self.store.open_assignment(report_id, volunteer_id).await?;
        if open.is_none() {
            return Err(AppError::NotAssigned(format!(
                "No open assignment on report {} for this volunteer",
                report_id
            )));
        }

        let verification = self
            .store
            .insert_verification(&NewVerification {
                report_id,
                volunteer_id: volunteer_id.to_string(),
                decision,
                note: note.clone(),
            })
            .await?;

        let outcome = self
            .store
            .resolve_if_pending(report_id, volunteer_id, decision, note.as_deref())
            .await?;

        let resolved = self
            .store
            .get_report(report_id)
            .await?
            .ok_or_else(|| AppError::Internal("Report vanished during resolution".to_string()))?;

        if !outcome.applied {
            // Lost the race; the verification row stays for audit
            tracing::info!(
                report_id = %report_id,
                volunteer_id = %volunteer_id,
                "Verification arrived after resolution"
            );
            return Ok(SubmitOutcome::AlreadyResolved { report: resolved });
        }

        for assignment in &outcome.released {
            self.manager.release(assignment).await;
            self.fanout
                .push(&assignment.volunteer_id, &PushEvent::report_resolved(&resolved));
        }

        tracing::info!(
            report_id = %report_id,
            volunteer_id = %volunteer_id,
            decision = %decision,
            released = outcome.released.len(),
            "Report resolved"
        );

        Ok(SubmitOutcome::Resolved {
            report: resolved,
            verification,
        })
    }

    /// Full verification history of a report, earliest first
    pub async fn history(&self, report_id: Uuid) -> Result<Vec<Verification>> {
        self.store.verifications_for_report(report_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::reports::models::{CreateReport, ReportStatus};
    use crate::modules::coordination::{CoordinationStore, MemoryCoordinationStore};
    use crate::modules::storage::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        coord: Arc<MemoryCoordinationStore>,
        manager: Arc<AssignmentManager>,
        resolver: VerificationResolver,
    }

    fn harness(k: usize) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let coord = Arc::new(MemoryCoordinationStore::new());
        let fanout = Arc::new(Fanout::new(16));
        let manager = Arc::new(AssignmentManager::new(
            store.clone(),
            coord.clone(),
            fanout.clone(),
            k,
        ));
        let resolver = VerificationResolver::new(store.clone(), manager.clone(), fanout);
        Harness {
            store,
            coord,
            manager,
            resolver,
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
    async fn first_submission_resolves_and_expires_siblings() {
        let h = harness(2);
        h.manager.register_volunteer("vol-a").await.unwrap();
        h.manager.register_volunteer("vol-b").await.unwrap();

        let report = h.store.insert_report(&report_data()).await.unwrap();
        h.manager.dispatch(&report).await.unwrap();

        let outcome = h
            .resolver
            .submit(report.id, "vol-a", Decision::Verified, Some("clean".into()))
            .await
            .unwrap();

        let resolved = match outcome {
            SubmitOutcome::Resolved { report, .. } => report,
            other => panic!("expected Resolved, got {:?}", other),
        };
        assert_eq!(resolved.status, ReportStatus::Verified);
        assert_eq!(resolved.verified_by.as_deref(), Some("vol-a"));

        // Winner completed, sibling expired
        let a = h.store.open_assignment(report.id, "vol-a").await.unwrap();
        let b = h.store.open_assignment(report.id, "vol-b").await.unwrap();
        assert!(a.is_none());
        assert!(b.is_none());

        // Both workloads returned to zero
        assert_eq!(h.coord.workload("vol-a").await.unwrap(), Some(0));
        assert_eq!(h.coord.workload("vol-b").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn second_submission_is_already_resolved() {
        let h = harness(2);
        h.manager.register_volunteer("vol-a").await.unwrap();
        h.manager.register_volunteer("vol-b").await.unwrap();

        let report = h.store.insert_report(&report_data()).await.unwrap();
        h.manager.dispatch(&report).await.unwrap();

        h.resolver
            .submit(report.id, "vol-a", Decision::Verified, None)
            .await
            .unwrap();

        let outcome = h
            .resolver
            .submit(report.id, "vol-b", Decision::Rejected, None)
            .await
            .unwrap();

        match outcome {
            SubmitOutcome::AlreadyResolved { report } => {
                // The first decision stands
                assert_eq!(report.status, ReportStatus::Verified);
                assert_eq!(report.verified_by.as_deref(), Some("vol-a"));
            }
            other => panic!("expected AlreadyResolved, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn concurrent_submissions_produce_exactly_one_winner() {
        let h = harness(2);
        h.manager.register_volunteer("vol-a").await.unwrap();
        h.manager.register_volunteer("vol-b").await.unwrap();

        let report = h.store.insert_report(&report_data()).await.unwrap();
        h.manager.dispatch(&report).await.unwrap();

        let (ra, rb) = tokio::join!(
            h.resolver
                .submit(report.id, "vol-a", Decision::Verified, None),
            h.resolver
                .submit(report.id, "vol-b", Decision::Rejected, None),
        );

        let wins = [ra.unwrap(), rb.unwrap()]
            .iter()
            .filter(|o| matches!(o, SubmitOutcome::Resolved { .. }))
            .count();
        assert_eq!(wins, 1);

        let resolved = h.store.get_report(report.id).await.unwrap().unwrap();
        assert_ne!(resolved.status, ReportStatus::Pending);
    }

    #[tokio::test]
    async fn unassigned_volunteer_is_rejected() {
        let h = harness(1);
        h.manager.register_volunteer("vol-a").await.unwrap();

        let report = h.store.insert_report(&report_data()).await.unwrap();
        h.manager.dispatch(&report).await.unwrap();

        let err = h
            .resolver
            .submit(report.id, "vol-intruder", Decision::Verified, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotAssigned(_)));
    }

    #[tokio::test]
    async fn expired_sibling_keeps_its_final_status() {
        let h = harness(2);
        h.manager.register_volunteer("vol-a").await.unwrap();
        h.manager.register_volunteer("vol-b").await.unwrap();

        let report = h.store.insert_report(&report_data()).await.unwrap();
        h.manager.dispatch(&report).await.unwrap();
        // vol-b acknowledged, then loses the race
        let b_assignment = h
            .store
            .open_assignment(report.id, "vol-b")
            .await
            .unwrap()
            .unwrap();
        h.manager.mark_viewed(b_assignment.id, "vol-b").await.unwrap();

        h.resolver
            .submit(report.id, "vol-a", Decision::Rejected, None)
            .await
            .unwrap();

        let history = h.store.verifications_for_report(report.id).await.unwrap();
        assert_eq!(history.len(), 1);

        let b_open = h.store.open_assignment(report.id, "vol-b").await.unwrap();
        assert!(b_open.is_none());
        let all_b = h
            .store
            .open_assignments_for_volunteer("vol-b")
            .await
            .unwrap();
        assert!(all_b.is_empty());

        // No half-open state survives resolution
        let leftovers = h
            .store
            .open_assignments_for_report(report.id)
            .await
            .unwrap();
        assert!(leftovers.is_empty());
    }
}
