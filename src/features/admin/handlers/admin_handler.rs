use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::admin::dtos::UserResponseDto;
use crate::features::assignments::dtos::AssignmentResponseDto;
use crate::features::assignments::services::AssignmentManager;
use crate::features::auth::model::AuthenticatedUser;
use crate::features::reconciliation::{Discrepancy, ReconciliationService, RepairSummary};
use crate::modules::coordination::{CoordinationStore, WorkloadSnapshot};
use crate::shared::types::ApiResponse;

/// Shared state for admin handlers
#[derive(Clone)]
pub struct AdminState {
    pub manager: Arc<AssignmentManager>,
    pub coord: Arc<dyn CoordinationStore>,
    pub reconciliation: Arc<ReconciliationService>,
}

fn require_admin(user: &AuthenticatedUser) -> Result<()> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }
    Ok(())
}

/// Enroll a user as a volunteer
#[utoipa::path(
    put,
    path = "/api/admin/volunteers/{id}",
    params(
        ("id" = String, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Volunteer registered", body = ApiResponse<UserResponseDto>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 503, description = "Coordination store unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn register_volunteer(
    user: AuthenticatedUser,
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserResponseDto>>> {
    require_admin(&user)?;

    let registered = state.manager.register_volunteer(&id).await?;
    Ok(Json(ApiResponse::success(
        Some(registered.into()),
        Some("Volunteer registered".to_string()),
        None,
    )))
}

/// Withdraw a volunteer from dispatch
#[utoipa::path(
    delete,
    path = "/api/admin/volunteers/{id}",
    params(
        ("id" = String, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Volunteer withdrawn; durable assignments untouched"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 503, description = "Coordination store unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn unregister_volunteer(
    user: AuthenticatedUser,
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    require_admin(&user)?;

    let removed = state.manager.unregister_volunteer(&id).await?;
    let message = if removed {
        "Volunteer withdrawn".to_string()
    } else {
        "Volunteer was not registered".to_string()
    };
    Ok(Json(ApiResponse::success(None, Some(message), None)))
}

/// Current workload scores and held reports per volunteer
#[utoipa::path(
    get,
    path = "/api/admin/workload",
    responses(
        (status = 200, description = "Workload snapshot", body = ApiResponse<WorkloadSnapshot>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 503, description = "Coordination store unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn workload_snapshot(
    user: AuthenticatedUser,
    State(state): State<AdminState>,
) -> Result<Json<ApiResponse<WorkloadSnapshot>>> {
    require_admin(&user)?;

    let snapshot = state.coord.snapshot().await?;
    Ok(Json(ApiResponse::success(Some(snapshot), None, None)))
}

/// Open assignments on a report
#[utoipa::path(
    get,
    path = "/api/admin/reports/{id}/assignments",
    params(
        ("id" = Uuid, Path, description = "Report ID")
    ),
    responses(
        (status = 200, description = "Open assignments, possibly empty", body = ApiResponse<Vec<AssignmentResponseDto>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn report_assignments(
    user: AuthenticatedUser,
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<AssignmentResponseDto>>>> {
    require_admin(&user)?;

    let open = state.manager.open_for_report(id).await?;
    let dtos: Vec<AssignmentResponseDto> = open.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::success(Some(dtos), None, None)))
}

/// Read-only consistency check between durable and derived state
#[utoipa::path(
    post,
    path = "/api/admin/reconcile/verify",
    responses(
        (status = 200, description = "Discrepancies found, possibly empty", body = ApiResponse<Vec<Discrepancy>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 503, description = "Coordination store unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn reconcile_verify(
    user: AuthenticatedUser,
    State(state): State<AdminState>,
) -> Result<Json<ApiResponse<Vec<Discrepancy>>>> {
    require_admin(&user)?;

    let found = state.reconciliation.verify().await?;
    Ok(Json(ApiResponse::success(Some(found), None, None)))
}

/// Corrective reconciliation pass
#[utoipa::path(
    post,
    path = "/api/admin/reconcile/repair",
    responses(
        (status = 200, description = "Repair summary", body = ApiResponse<RepairSummary>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 503, description = "Coordination store unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn reconcile_repair(
    user: AuthenticatedUser,
    State(state): State<AdminState>,
) -> Result<Json<ApiResponse<RepairSummary>>> {
    require_admin(&user)?;

    let summary = state.reconciliation.repair().await?;
    Ok(Json(ApiResponse::success(Some(summary), None, None)))
}
