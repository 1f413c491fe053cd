use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use utoipa::ToSchema;
use uuid::Uuid;

/// Assignment status enum matching database enum.
///
/// Pending and viewed are the open states. Once the owning report leaves
/// pending, every open sibling must end up completed or expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "assignment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Viewed,
    Completed,
    Expired,
}

impl AssignmentStatus {
    /// Open assignments count toward a volunteer's workload score
    pub fn is_open(&self) -> bool {
        matches!(self, AssignmentStatus::Pending | AssignmentStatus::Viewed)
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentStatus::Pending => write!(f, "pending"),
            AssignmentStatus::Viewed => write!(f, "viewed"),
            AssignmentStatus::Completed => write!(f, "completed"),
            AssignmentStatus::Expired => write!(f, "expired"),
        }
    }
}

/// One volunteer's claim on one report
#[derive(Debug, Clone, FromRow)]
pub struct Assignment {
    pub id: Uuid,
    pub report_id: Uuid,
    pub volunteer_id: String,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
