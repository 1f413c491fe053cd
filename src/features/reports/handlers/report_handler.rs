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
use crate::features::reports::dtos::{CreateReportDto, CreateReportResultDto, ReportResponseDto};
use crate::features::reports::services::ReportService;
use crate::shared::types::{ApiResponse, Meta};

/// Submit a waste report
#[utoipa::path(
    post,
    path = "/api/reports",
    request_body = CreateReportDto,
    responses(
        (status = 200, description = "Report created, or a recent duplicate returned", body = ApiResponse<CreateReportResultDto>),
        (status = 401, description = "Unauthorized"),
        (status = 400, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn create_report(
    user: AuthenticatedUser,
    State(service): State<Arc<ReportService>>,
    AppJson(payload): AppJson<CreateReportDto>,
) -> Result<Json<ApiResponse<CreateReportResultDto>>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let (report, duplicate) = service.create(&user.sub, &payload).await?;
    let message = if duplicate {
        "A matching report was already submitted recently".to_string()
    } else {
        "Report created".to_string()
    };
    let dto = CreateReportResultDto {
        duplicate,
        report: report.into(),
    };
    Ok(Json(ApiResponse::success(Some(dto), Some(message), None)))
}

/// List the authenticated reporter's own reports
#[utoipa::path(
    get,
    path = "/api/reports",
    responses(
        (status = 200, description = "Reports submitted by the user", body = ApiResponse<Vec<ReportResponseDto>>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn list_reports(
    user: AuthenticatedUser,
    State(service): State<Arc<ReportService>>,
) -> Result<Json<ApiResponse<Vec<ReportResponseDto>>>> {
    let reports = service.list_by_reporter(&user.sub).await?;
    let total = reports.len() as i64;
    let dtos: Vec<ReportResponseDto> = reports.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::success(
        Some(dtos),
        None,
        Some(Meta { total }),
    )))
}

/// Get a report by id
#[utoipa::path(
    get,
    path = "/api/reports/{id}",
    params(
        ("id" = Uuid, Path, description = "Report ID")
    ),
    responses(
        (status = 200, description = "Report found", body = ApiResponse<ReportResponseDto>),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Report not found")
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn get_report(
    user: AuthenticatedUser,
    State(service): State<Arc<ReportService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ReportResponseDto>>> {
    let report = service.get(id).await?;
    // Reporters only see their own reports; volunteers and admins see all
    if report.reporter_id != user.sub && !user.is_volunteer() && !user.is_admin() {
        return Err(AppError::NotFound(format!("Report {} not found", id)));
    }
    Ok(Json(ApiResponse::success(Some(report.into()), None, None)))
}

#[cfg(test)]
mod tests {
    use axum_test::TestServer;
    use serde_json::{json, Value};

    use super::*;
    use crate::features::assignments::services::AssignmentManager;
    use crate::features::realtime::Fanout;
    use crate::features::reports::routes;
    use crate::modules::coordination::MemoryCoordinationStore;
    use crate::modules::storage::MemoryStore;
    use crate::shared::test_helpers::with_user_auth;

    fn reporter_user(sub: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            sub: sub.to_string(),
            roles: vec!["reporter".to_string()],
        }
    }

    async fn server_for(user: AuthenticatedUser) -> (Arc<AssignmentManager>, TestServer) {
        let store = Arc::new(MemoryStore::new());
        let coord = Arc::new(MemoryCoordinationStore::new());
        let fanout = Arc::new(Fanout::new(16));
        let manager = Arc::new(AssignmentManager::new(
            store.clone(),
            coord,
            fanout,
            2,
        ));
        let service = Arc::new(ReportService::new(store, manager.clone(), 3600));
        let router = with_user_auth(routes::routes(service), user);
        (manager, TestServer::new(router).unwrap())
    }

    #[tokio::test]
    async fn create_report_returns_created_report() {
        let (manager, server) = server_for(reporter_user("rep-1")).await;
        manager.register_volunteer("vol-a").await.unwrap();

        let response = server
            .post("/api/reports")
            .json(&json!({
                "category": "illegal-dumping",
                "lat": -7.25,
                "lng": 112.75,
                "image_url": "https://img.example/1.jpg"
            }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["duplicate"], json!(false));
        assert_eq!(body["data"]["report"]["status"], json!("pending"));
        assert_eq!(body["data"]["report"]["reporter_id"], json!("rep-1"));
    }

    #[tokio::test]
    async fn invalid_category_is_rejected() {
        let (_, server) = server_for(reporter_user("rep-1")).await;

        let response = server
            .post("/api/reports")
            .json(&json!({
                "category": "Illegal Dumping",
                "lat": -7.25,
                "lng": 112.75,
                "image_url": "https://img.example/1.jpg"
            }))
            .await;

        response.assert_status_bad_request();
        let body: Value = response.json();
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn out_of_range_coordinates_are_rejected() {
        let (_, server) = server_for(reporter_user("rep-1")).await;

        let response = server
            .post("/api/reports")
            .json(&json!({
                "category": "illegal-dumping",
                "lat": 95.0,
                "lng": 112.75,
                "image_url": "https://img.example/1.jpg"
            }))
            .await;

        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn reporter_can_read_own_report() {
        let (manager, server) = server_for(reporter_user("rep-1")).await;
        manager.register_volunteer("vol-a").await.unwrap();

        let created = server
            .post("/api/reports")
            .json(&json!({
                "category": "illegal-dumping",
                "lat": -7.25,
                "lng": 112.75,
                "image_url": "https://img.example/1.jpg"
            }))
            .await;
        let id = created.json::<Value>()["data"]["report"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let mine = server.get(&format!("/api/reports/{}", id)).await;
        mine.assert_status_ok();

        let listed = server.get("/api/reports").await;
        listed.assert_status_ok();
        let body: Value = listed.json();
        assert_eq!(body["meta"]["total"], json!(1));
    }

}
