use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::admin::models::User;
use crate::features::assignments::models::{Assignment, AssignmentStatus};
use crate::features::reports::models::{CreateReport, Report, ReportStatus};
use crate::features::verifications::models::{Decision, NewVerification, Verification};
use crate::shared::constants::ROLE_VOLUNTEER;

use super::{status_for, DurableStore, ResolveOutcome};

#[derive(Default)]
struct MemInner {
    reports: HashMap<Uuid, Report>,
    assignments: HashMap<Uuid, Assignment>,
    /// Insertion order doubles as the created-at tie break
    verifications: Vec<Verification>,
    users: HashMap<String, User>,
}

/// In-memory durable store with the same atomicity guarantees as the
/// Postgres implementation: every mutation runs under one lock, so the
/// conditional resolve observes no torn state.
///
/// Used by tests and DB-less harnesses.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn insert_report(&self, data: &CreateReport) -> Result<Report> {
        let now = Utc::now();
        let report = Report {
            id: Uuid::new_v4(),
            reporter_id: data.reporter_id.clone(),
            category: data.category.clone(),
            lat: data.lat,
            lng: data.lng,
            image_url: data.image_url.clone(),
            image_hash: data.image_hash.clone(),
            status: ReportStatus::Pending,
            assigned_count: 0,
            priority: data.priority,
            remarks: None,
            verified_by: None,
            verified_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.lock().unwrap();
        inner.reports.insert(report.id, report.clone());
        Ok(report)
    }

    async fn get_report(&self, id: Uuid) -> Result<Option<Report>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.reports.get(&id).cloned())
    }

    async fn list_reports_by_reporter(&self, reporter_id: &str) -> Result<Vec<Report>> {
        let inner = self.inner.lock().unwrap();
        let mut reports: Vec<Report> = inner
            .reports
            .values()
            .filter(|r| r.reporter_id == reporter_id)
            .cloned()
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    async fn find_recent_duplicate(
        &self,
        image_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Report>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .reports
            .values()
            .filter(|r| r.image_hash.as_deref() == Some(image_hash) && r.created_at >= since)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn add_assigned_count(&self, report_id: Uuid, delta: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(report) = inner.reports.get_mut(&report_id) {
            report.assigned_count += delta;
            report.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_assignment(&self, report_id: Uuid, volunteer_id: &str) -> Result<Assignment> {
        let mut inner = self.inner.lock().unwrap();

        // One live claim per (report, volunteer), matching the partial
        // unique index in Postgres.
        let duplicate = inner.assignments.values().any(|a| {
            a.report_id == report_id && a.volunteer_id == volunteer_id && a.status.is_open()
        });
        if duplicate {
            return Err(AppError::Conflict(format!(
                "Volunteer {} already holds report {}",
                volunteer_id, report_id
            )));
        }

        let now = Utc::now();
        let assignment = Assignment {
            id: Uuid::new_v4(),
            report_id,
            volunteer_id: volunteer_id.to_string(),
            status: AssignmentStatus::Pending,
            assigned_at: now,
            updated_at: now,
        };
        inner.assignments.insert(assignment.id, assignment.clone());
        Ok(assignment)
    }

    async fn mark_assignment_viewed(
        &self,
        assignment_id: Uuid,
        volunteer_id: &str,
    ) -> Result<Assignment> {
        let mut inner = self.inner.lock().unwrap();
        let assignment = inner
            .assignments
            .get_mut(&assignment_id)
            .filter(|a| a.volunteer_id == volunteer_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("Assignment {} not found", assignment_id))
            })?;

        if assignment.status != AssignmentStatus::Pending {
            return Err(AppError::InvalidTransition(format!(
                "Assignment {} is {}, expected pending",
                assignment_id, assignment.status
            )));
        }

        assignment.status = AssignmentStatus::Viewed;
        assignment.updated_at = Utc::now();
        Ok(assignment.clone())
    }

    async fn open_assignment(
        &self,
        report_id: Uuid,
        volunteer_id: &str,
    ) -> Result<Option<Assignment>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .assignments
            .values()
            .find(|a| {
                a.report_id == report_id && a.volunteer_id == volunteer_id && a.status.is_open()
            })
            .cloned())
    }

    async fn open_assignments_for_report(&self, report_id: Uuid) -> Result<Vec<Assignment>> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<Assignment> = inner
            .assignments
            .values()
            .filter(|a| a.report_id == report_id && a.status.is_open())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at));
        Ok(out)
    }

    async fn open_assignments_for_volunteer(&self, volunteer_id: &str) -> Result<Vec<Assignment>> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<Assignment> = inner
            .assignments
            .values()
            .filter(|a| a.volunteer_id == volunteer_id && a.status.is_open())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at));
        Ok(out)
    }

    async fn insert_verification(&self, data: &NewVerification) -> Result<Verification> {
        let verification = Verification {
            id: Uuid::new_v4(),
            report_id: data.report_id,
            volunteer_id: data.volunteer_id.clone(),
            decision: data.decision,
            note: data.note.clone(),
            created_at: Utc::now(),
        };

        let mut inner = self.inner.lock().unwrap();
        inner.verifications.push(verification.clone());
        Ok(verification)
    }

    async fn verifications_for_report(&self, report_id: Uuid) -> Result<Vec<Verification>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .verifications
            .iter()
            .filter(|v| v.report_id == report_id)
            .cloned()
            .collect())
    }

    async fn resolve_if_pending(
        &self,
        report_id: Uuid,
        volunteer_id: &str,
        decision: Decision,
        note: Option<&str>,
    ) -> Result<ResolveOutcome> {
        let mut inner = self.inner.lock().unwrap();

        let report = inner
            .reports
            .get_mut(&report_id)
            .ok_or_else(|| AppError::NotFound(format!("Report {} not found", report_id)))?;

        if report.status != ReportStatus::Pending {
            return Ok(ResolveOutcome {
                applied: false,
                released: Vec::new(),
            });
        }

        let now = Utc::now();
        report.status = status_for(decision);
        report.verified_by = Some(volunteer_id.to_string());
        report.verified_at = Some(now);
        if note.is_some() {
            report.remarks = note.map(String::from);
        }
        report.updated_at = now;

        let mut released = Vec::new();
        for assignment in inner.assignments.values_mut() {
            if assignment.report_id == report_id && assignment.status.is_open() {
                assignment.status = if assignment.volunteer_id == volunteer_id {
                    AssignmentStatus::Completed
                } else {
                    AssignmentStatus::Expired
                };
                assignment.updated_at = now;
                released.push(assignment.clone());
            }
        }
        // Winner first, matching the Postgres implementation
        released.sort_by_key(|a| a.volunteer_id != volunteer_id);

        Ok(ResolveOutcome {
            applied: true,
            released,
        })
    }

    async fn upsert_user_role(&self, user_id: &str, role: &str) -> Result<User> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .users
            .entry(user_id.to_string())
            .and_modify(|u| {
                u.role = role.to_string();
                u.updated_at = now;
            })
            .or_insert_with(|| User {
                id: user_id.to_string(),
                display_name: None,
                role: role.to_string(),
                created_at: now,
                updated_at: now,
            });
        Ok(user.clone())
    }

    async fn volunteer_ids(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let mut ids: Vec<String> = inner
            .users
            .values()
            .filter(|u| u.role == ROLE_VOLUNTEER)
            .map(|u| u.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn resolved_reports_with_open_assignments(&self) -> Result<Vec<Uuid>> {
        let inner = self.inner.lock().unwrap();
        let mut ids: BTreeSet<Uuid> = BTreeSet::new();
        for assignment in inner.assignments.values() {
            if !assignment.status.is_open() {
                continue;
            }
            if let Some(report) = inner.reports.get(&assignment.report_id) {
                if report.status != ReportStatus::Pending {
                    ids.insert(report.id);
                }
            }
        }
        Ok(ids.into_iter().collect())
    }

    async fn expire_open_assignments(&self, report_id: Uuid) -> Result<Vec<Assignment>> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        let mut expired = Vec::new();
        for assignment in inner.assignments.values_mut() {
            if assignment.report_id == report_id && assignment.status.is_open() {
                assignment.status = AssignmentStatus::Expired;
                assignment.updated_at = now;
                expired.push(assignment.clone());
            }
        }
        Ok(expired)
    }

    async fn pending_reports_with_earliest_verification(&self) -> Result<Vec<Verification>> {
        let inner = self.inner.lock().unwrap();
        let mut earliest: BTreeMap<Uuid, Verification> = BTreeMap::new();
        for verification in &inner.verifications {
            let pending = inner
                .reports
                .get(&verification.report_id)
                .map(|r| r.status == ReportStatus::Pending)
                .unwrap_or(false);
            if pending {
                // Vec order is insertion order, so first match is earliest
                earliest
                    .entry(verification.report_id)
                    .or_insert_with(|| verification.clone());
            }
        }
        Ok(earliest.into_values().collect())
    }

    async fn open_assignment_counts(&self) -> Result<BTreeMap<String, i64>> {
        let inner = self.inner.lock().unwrap();
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for assignment in inner.assignments.values() {
            if assignment.status.is_open() {
                *counts.entry(assignment.volunteer_id.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn open_reports_by_volunteer(&self) -> Result<BTreeMap<String, BTreeSet<Uuid>>> {
        let inner = self.inner.lock().unwrap();
        let mut held: BTreeMap<String, BTreeSet<Uuid>> = BTreeMap::new();
        for assignment in inner.assignments.values() {
            if assignment.status.is_open() {
                held.entry(assignment.volunteer_id.clone())
                    .or_default()
                    .insert(assignment.report_id);
            }
        }
        Ok(held)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> CreateReport {
        CreateReport {
            reporter_id: "citizen-1".to_string(),
            category: "illegal-dumping".to_string(),
            lat: -7.2575,
            lng: 112.7521,
            image_url: "https://img.example/1.jpg".to_string(),
            image_hash: Some("a1b2c3d4e5f60718".to_string()),
            priority: 0,
        }
    }

    #[tokio::test]
    async fn resolve_is_first_commit_wins() {
        let store = MemoryStore::new();
        let report = store.insert_report(&sample_report()).await.unwrap();
        store.insert_assignment(report.id, "vol-a").await.unwrap();
        store.insert_assignment(report.id, "vol-b").await.unwrap();

        let first = store
            .resolve_if_pending(report.id, "vol-a", Decision::Verified, Some("confirmed"))
            .await
            .unwrap();
        assert!(first.applied);
        assert_eq!(first.released.len(), 2);
        assert_eq!(first.released[0].volunteer_id, "vol-a");
        assert_eq!(first.released[0].status, AssignmentStatus::Completed);
        assert_eq!(first.released[1].status, AssignmentStatus::Expired);

        let second = store
            .resolve_if_pending(report.id, "vol-b", Decision::Rejected, None)
            .await
            .unwrap();
        assert!(!second.applied);
        assert!(second.released.is_empty());

        let report = store.get_report(report.id).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Verified);
        assert_eq!(report.verified_by.as_deref(), Some("vol-a"));
        assert_eq!(report.remarks.as_deref(), Some("confirmed"));
    }

    #[tokio::test]
    async fn viewed_transition_is_exactly_once() {
        let store = MemoryStore::new();
        let report = store.insert_report(&sample_report()).await.unwrap();
        let assignment = store.insert_assignment(report.id, "vol-a").await.unwrap();

        let viewed = store
            .mark_assignment_viewed(assignment.id, "vol-a")
            .await
            .unwrap();
        assert_eq!(viewed.status, AssignmentStatus::Viewed);

        let again = store.mark_assignment_viewed(assignment.id, "vol-a").await;
        assert!(matches!(again, Err(AppError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn duplicate_open_claim_is_rejected() {
        let store = MemoryStore::new();
        let report = store.insert_report(&sample_report()).await.unwrap();
        store.insert_assignment(report.id, "vol-a").await.unwrap();

        let dup = store.insert_assignment(report.id, "vol-a").await;
        assert!(matches!(dup, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn duplicate_lookup_respects_window() {
        let store = MemoryStore::new();
        let report = store.insert_report(&sample_report()).await.unwrap();

        let hit = store
            .find_recent_duplicate("a1b2c3d4e5f60718", report.created_at - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(hit.is_some());

        let miss = store
            .find_recent_duplicate("a1b2c3d4e5f60718", report.created_at + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(miss.is_none());
    }
}
