use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::features::assignments::models::Assignment;
use crate::features::reports::models::{Report, ReportStatus};

/// Events pushed to connected volunteers.
///
/// Delivery is best-effort; clients reconcile by polling their open
/// assignments, so every event carries enough context to render without a
/// follow-up fetch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    AssignmentCreated {
        assignment_id: Uuid,
        report_id: Uuid,
        category: String,
        lat: f64,
        lng: f64,
        image_url: String,
        priority: i32,
        assigned_at: DateTime<Utc>,
    },
    AssignmentExpired {
        assignment_id: Uuid,
        report_id: Uuid,
    },
    ReportResolved {
        report_id: Uuid,
        status: ReportStatus,
        verified_by: String,
    },
}

impl PushEvent {
    /// SSE event name
    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::AssignmentCreated { .. } => "assignment.created",
            PushEvent::AssignmentExpired { .. } => "assignment.expired",
            PushEvent::ReportResolved { .. } => "report.resolved",
        }
    }

    pub fn assignment_created(report: &Report, assignment: &Assignment) -> Self {
        PushEvent::AssignmentCreated {
            assignment_id: assignment.id,
            report_id: report.id,
            category: report.category.clone(),
            lat: report.lat,
            lng: report.lng,
            image_url: report.image_url.clone(),
            priority: report.priority,
            assigned_at: assignment.assigned_at,
        }
    }

    pub fn assignment_expired(assignment: &Assignment) -> Self {
        PushEvent::AssignmentExpired {
            assignment_id: assignment.id,
            report_id: assignment.report_id,
        }
    }

    pub fn report_resolved(report: &Report) -> Self {
        PushEvent::ReportResolved {
            report_id: report.id,
            status: report.status,
            verified_by: report.verified_by.clone().unwrap_or_default(),
        }
    }
}
