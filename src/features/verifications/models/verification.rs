use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use utoipa::ToSchema;
use uuid::Uuid;

/// A volunteer's decision on a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "verification_decision", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Verified,
    Rejected,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Verified => write!(f, "verified"),
            Decision::Rejected => write!(f, "rejected"),
        }
    }
}

/// Append-only verification record. Rows are never updated; the earliest
/// row for a report is the authoritative one.
#[derive(Debug, Clone, FromRow)]
pub struct Verification {
    pub id: Uuid,
    pub report_id: Uuid,
    pub volunteer_id: String,
    pub decision: Decision,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Data for appending a verification row
#[derive(Debug, Clone)]
pub struct NewVerification {
    pub report_id: Uuid,
    pub volunteer_id: String,
    pub decision: Decision,
    pub note: Option<String>,
}
