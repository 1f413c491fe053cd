use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::AppJson;
use crate::features::auth::model::AuthenticatedUser;
use crate::features::verifications::dtos::{
    SubmitResultDto, SubmitVerificationDto, VerificationResponseDto,
};
use crate::features::verifications::services::{SubmitOutcome, VerificationResolver};
use crate::shared::types::{ApiResponse, Meta};

/// Submit a verification for an assigned report
#[utoipa::path(
    post,
    path = "/api/reports/{id}/verifications",
    params(
        ("id" = Uuid, Path, description = "Report ID")
    ),
    request_body = SubmitVerificationDto,
    responses(
        (status = 200, description = "Submission accepted; resolved_by_this tells whether it decided the report", body = ApiResponse<SubmitResultDto>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Volunteer has no open assignment on this report"),
        (status = 404, description = "Report not found")
    ),
    security(("bearer_auth" = [])),
    tag = "verifications"
)]
pub async fn submit_verification(
    user: AuthenticatedUser,
    State(resolver): State<Arc<VerificationResolver>>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<SubmitVerificationDto>,
) -> Result<Json<ApiResponse<SubmitResultDto>>> {
    if !user.is_volunteer() {
        return Err(AppError::Forbidden(
            "Only volunteers can submit verifications".to_string(),
        ));
    }
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let outcome = resolver
        .submit(id, &user.sub, payload.decision, payload.note)
        .await?;

    let (dto, message) = match outcome {
        SubmitOutcome::Resolved { report, .. } => (
            SubmitResultDto {
                resolved_by_this: true,
                report: report.into(),
            },
            "Report resolved".to_string(),
        ),
        SubmitOutcome::AlreadyResolved { report } => (
            SubmitResultDto {
                resolved_by_this: false,
                report: report.into(),
            },
            "Report was already resolved".to_string(),
        ),
    };

    Ok(Json(ApiResponse::success(Some(dto), Some(message), None)))
}

/// Verification history of a report, earliest first
#[utoipa::path(
    get,
    path = "/api/reports/{id}/verifications",
    params(
        ("id" = Uuid, Path, description = "Report ID")
    ),
    responses(
        (status = 200, description = "Verification history", body = ApiResponse<Vec<VerificationResponseDto>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "verifications"
)]
pub async fn list_verifications(
    user: AuthenticatedUser,
    State(resolver): State<Arc<VerificationResolver>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<VerificationResponseDto>>>> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only admins can read verification history".to_string(),
        ));
    }

    let history = resolver.history(id).await?;
    let total = history.len() as i64;
    let dtos: Vec<VerificationResponseDto> = history.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::success(
        Some(dtos),
        None,
        Some(Meta { total }),
    )))
}
