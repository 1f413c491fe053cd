use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::features::reports::models::Report;
use crate::shared::validation::{CATEGORY_REGEX, IMAGE_HASH_REGEX};

fn default_priority() -> i32 {
    0
}

/// Citizen submission of a waste report
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateReportDto {
    #[validate(regex(
        path = *CATEGORY_REGEX,
        message = "Category must be lowercase alphanumeric segments separated by hyphens"
    ))]
    pub category: String,
    #[validate(range(min = -90.0, max = 90.0, message = "Latitude must be between -90 and 90"))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0, message = "Longitude must be between -180 and 180"))]
    pub lng: f64,
    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: String,
    /// Hex digest of the image, used for duplicate detection
    #[validate(regex(
        path = *IMAGE_HASH_REGEX,
        message = "Image hash must be a lowercase hex digest"
    ))]
    pub image_hash: Option<String>,
    #[serde(default = "default_priority")]
    #[validate(range(min = 0, max = 10, message = "Priority must be between 0 and 10"))]
    pub priority: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportResponseDto {
    pub id: Uuid,
    pub reporter_id: String,
    pub category: String,
    pub lat: f64,
    pub lng: f64,
    pub image_url: String,
    pub status: String,
    pub assigned_count: i32,
    pub priority: i32,
    pub remarks: Option<String>,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Report> for ReportResponseDto {
    fn from(r: Report) -> Self {
        Self {
            id: r.id,
            reporter_id: r.reporter_id,
            category: r.category,
            lat: r.lat,
            lng: r.lng,
            image_url: r.image_url,
            status: r.status.to_string(),
            assigned_count: r.assigned_count,
            priority: r.priority,
            remarks: r.remarks,
            verified_by: r.verified_by,
            verified_at: r.verified_at,
            created_at: r.created_at,
        }
    }
}

/// Creation response; flags when an existing report was returned instead
/// of a new one
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateReportResultDto {
    /// True when the submission matched a recent report with the same
    /// image hash and no new report was created
    pub duplicate: bool,
    pub report: ReportResponseDto,
}
