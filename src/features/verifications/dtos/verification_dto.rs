use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::features::reports::dtos::ReportResponseDto;
use crate::features::verifications::models::{Decision, Verification};

/// Verification submitted by a volunteer against an assigned report
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitVerificationDto {
    pub decision: Decision,
    #[validate(length(max = 2000, message = "Note must be at most 2000 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerificationResponseDto {
    pub id: Uuid,
    pub report_id: Uuid,
    pub volunteer_id: String,
    pub decision: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Verification> for VerificationResponseDto {
    fn from(v: Verification) -> Self {
        Self {
            id: v.id,
            report_id: v.report_id,
            volunteer_id: v.volunteer_id,
            decision: v.decision.to_string(),
            note: v.note,
            created_at: v.created_at,
        }
    }
}

/// Outcome of a submission: whether this verification decided the report
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitResultDto {
    /// True when this submission resolved the report, false when a
    /// concurrent or earlier verification had already done so
    pub resolved_by_this: bool,
    pub report: ReportResponseDto,
}
