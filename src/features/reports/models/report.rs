use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use utoipa::ToSchema;
use uuid::Uuid;

/// Report status enum matching database enum.
///
/// Pending reports are the only ones volunteers may still act on; the
/// transition out of pending happens exactly once and is never reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "report_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Verified,
    Rejected,
}

impl ReportStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, ReportStatus::Pending)
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Pending => write!(f, "pending"),
            ReportStatus::Verified => write!(f, "verified"),
            ReportStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Database model for a waste report
#[derive(Debug, Clone, FromRow)]
pub struct Report {
    pub id: Uuid,
    pub reporter_id: String,
    pub category: String,
    pub lat: f64,
    pub lng: f64,
    pub image_url: String,
    /// Perceptual hash of the submitted image, used for duplicate detection
    /// within a configured window
    pub image_hash: Option<String>,
    pub status: ReportStatus,
    /// Number of volunteers that have ever held an assignment for this report
    pub assigned_count: i32,
    pub priority: i32,
    /// Verification note or rejection reason, set on resolution
    pub remarks: Option<String>,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data for creating a new report
#[derive(Debug, Clone)]
pub struct CreateReport {
    pub reporter_id: String,
    pub category: String,
    pub lat: f64,
    pub lng: f64,
    pub image_url: String,
    pub image_hash: Option<String>,
    pub priority: i32,
}
