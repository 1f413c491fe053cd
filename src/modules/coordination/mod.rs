use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod memory;

pub use memory::MemoryCoordinationStore;

use crate::core::error::AppError;

#[derive(Debug, Error)]
pub enum CoordError {
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),
}

impl From<CoordError> for AppError {
    fn from(e: CoordError) -> Self {
        AppError::CoordinationUnavailable(e.to_string())
    }
}

pub type CoordResult<T> = Result<T, CoordError>;

/// Diagnostic view of the coordination state
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorkloadSnapshot {
    /// Current workload score per registered volunteer
    pub scores: BTreeMap<String, i64>,
    /// Report ids currently held per volunteer
    pub held: BTreeMap<String, Vec<Uuid>>,
}

/// Replacement state for a full rebuild from durable facts
#[derive(Debug, Clone, Default)]
pub struct RebuildState {
    pub scores: BTreeMap<String, i64>,
    pub held: BTreeMap<String, BTreeSet<Uuid>>,
}

/// Fast, derived workload accounting used for dispatch selection and
/// fanout lookups.
///
/// Every operation is individually atomic, but there are no cross-key
/// transactions: multi-step sequences (dispatch) tolerate momentary drift
/// against the durable store, which reconciliation corrects. Scores never
/// go below zero. Increment/decrement are the only permitted score
/// mutations outside [`CoordinationStore::rebuild`].
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Initialize a volunteer's score to 0 if absent. Idempotent.
    /// Returns true when the volunteer was newly registered.
    async fn register(&self, volunteer_id: &str) -> CoordResult<bool>;

    /// Remove the volunteer's score and membership sets. Idempotent.
    async fn unregister(&self, volunteer_id: &str) -> CoordResult<bool>;

    /// Atomic +1. Returns the new score, or None when the volunteer is not
    /// registered (an unregistered volunteer must not be resurrected by a
    /// racing dispatch).
    async fn incr_workload(&self, volunteer_id: &str) -> CoordResult<Option<i64>>;

    /// Atomic -1, floored at zero. Returns the new score, or None when the
    /// volunteer is not registered.
    async fn decr_workload(&self, volunteer_id: &str) -> CoordResult<Option<i64>>;

    async fn workload(&self, volunteer_id: &str) -> CoordResult<Option<i64>>;

    /// The k lowest-scored registered volunteers, ties broken by volunteer
    /// id ascending for determinism.
    async fn least_loaded(&self, k: usize) -> CoordResult<Vec<(String, i64)>>;

    /// Record that a volunteer holds a report (both membership directions)
    async fn add_held(&self, volunteer_id: &str, report_id: Uuid) -> CoordResult<()>;

    async fn remove_held(&self, volunteer_id: &str, report_id: Uuid) -> CoordResult<()>;

    async fn reports_held_by(&self, volunteer_id: &str) -> CoordResult<Vec<Uuid>>;

    async fn volunteers_holding(&self, report_id: Uuid) -> CoordResult<Vec<String>>;

    async fn snapshot(&self) -> CoordResult<WorkloadSnapshot>;

    /// Atomically replace all scores and memberships with state derived
    /// from the durable store
    async fn rebuild(&self, state: RebuildState) -> CoordResult<()>;
}
