use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::features::assignments::models::Assignment;

/// Assignment as returned to volunteers
#[derive(Debug, Serialize, ToSchema)]
pub struct AssignmentResponseDto {
    pub id: Uuid,
    pub report_id: Uuid,
    pub volunteer_id: String,
    pub status: String,
    pub assigned_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Assignment> for AssignmentResponseDto {
    fn from(a: Assignment) -> Self {
        Self {
            id: a.id,
            report_id: a.report_id,
            volunteer_id: a.volunteer_id,
            status: a.status.to_string(),
            assigned_at: a.assigned_at,
            updated_at: a.updated_at,
        }
    }
}
