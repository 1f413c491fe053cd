use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::error::Result;
use crate::features::admin::models::User;
use crate::features::assignments::models::Assignment;
use crate::features::reports::models::{CreateReport, Report, ReportStatus};
use crate::features::verifications::models::{Decision, NewVerification, Verification};

pub mod memory;
pub mod postgres;

#[allow(unused_imports)]
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Report status a decision maps to when it wins
pub fn status_for(decision: Decision) -> ReportStatus {
    match decision {
        Decision::Verified => ReportStatus::Verified,
        Decision::Rejected => ReportStatus::Rejected,
    }
}

/// Result of a conditional resolve against a report.
///
/// `applied` is false when a concurrent resolution committed first; in that
/// case nothing was changed and `released` is empty.
#[derive(Debug)]
pub struct ResolveOutcome {
    pub applied: bool,
    /// Assignments that left the open states as part of this resolution,
    /// already carrying their final status
    pub released: Vec<Assignment>,
}

/// Transactional source of truth for reports, assignments, verifications
/// and users.
///
/// Every multi-row mutation here happens inside a single transaction; the
/// conditional resolve is the serialization point for competing
/// verifications. Implemented by [`PgStore`] for production and
/// [`MemoryStore`] for tests and DB-less harnesses.
#[async_trait]
pub trait DurableStore: Send + Sync {
    // ===== Reports =====

    async fn insert_report(&self, data: &CreateReport) -> Result<Report>;

    async fn get_report(&self, id: Uuid) -> Result<Option<Report>>;

    async fn list_reports_by_reporter(&self, reporter_id: &str) -> Result<Vec<Report>>;

    /// Most recent report sharing the given image hash created at or after
    /// `since`, regardless of status
    async fn find_recent_duplicate(
        &self,
        image_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Report>>;

    async fn add_assigned_count(&self, report_id: Uuid, delta: i32) -> Result<()>;

    // ===== Assignments =====

    async fn insert_assignment(&self, report_id: Uuid, volunteer_id: &str) -> Result<Assignment>;

    /// Transition pending → viewed exactly once. `InvalidTransition` when the
    /// assignment exists but is not pending.
    async fn mark_assignment_viewed(
        &self,
        assignment_id: Uuid,
        volunteer_id: &str,
    ) -> Result<Assignment>;

    async fn open_assignment(
        &self,
        report_id: Uuid,
        volunteer_id: &str,
    ) -> Result<Option<Assignment>>;

    async fn open_assignments_for_report(&self, report_id: Uuid) -> Result<Vec<Assignment>>;

    async fn open_assignments_for_volunteer(&self, volunteer_id: &str) -> Result<Vec<Assignment>>;

    // ===== Verifications =====

    async fn insert_verification(&self, data: &NewVerification) -> Result<Verification>;

    async fn verifications_for_report(&self, report_id: Uuid) -> Result<Vec<Verification>>;

    /// Atomic first-commit-wins resolution: update the report only if it is
    /// still pending, complete the winning volunteer's open assignment and
    /// expire the remaining open siblings, all in one transaction.
    async fn resolve_if_pending(
        &self,
        report_id: Uuid,
        volunteer_id: &str,
        decision: Decision,
        note: Option<&str>,
    ) -> Result<ResolveOutcome>;

    // ===== Users =====

    async fn upsert_user_role(&self, user_id: &str, role: &str) -> Result<User>;

    /// Ids of users currently holding the volunteer role
    async fn volunteer_ids(&self) -> Result<Vec<String>>;

    // ===== Reconciliation queries =====

    /// Reports that left pending but still have open assignments
    async fn resolved_reports_with_open_assignments(&self) -> Result<Vec<Uuid>>;

    /// Expire every open assignment of a report, returning the expired rows
    async fn expire_open_assignments(&self, report_id: Uuid) -> Result<Vec<Assignment>>;

    /// Earliest verification of each report that is still pending despite
    /// having at least one verification recorded
    async fn pending_reports_with_earliest_verification(&self) -> Result<Vec<Verification>>;

    /// Open-assignment count per volunteer, derived from assignment rows
    async fn open_assignment_counts(&self) -> Result<BTreeMap<String, i64>>;

    /// Report ids currently held open per volunteer
    async fn open_reports_by_volunteer(&self) -> Result<BTreeMap<String, BTreeSet<Uuid>>>;
}
