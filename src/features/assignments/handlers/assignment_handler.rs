use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::assignments::dtos::AssignmentResponseDto;
use crate::features::assignments::services::AssignmentManager;
use crate::features::auth::model::AuthenticatedUser;
use crate::shared::types::{ApiResponse, Meta};

/// List the authenticated volunteer's open assignments
#[utoipa::path(
    get,
    path = "/api/assignments",
    responses(
        (status = 200, description = "Open assignments for the volunteer", body = ApiResponse<Vec<AssignmentResponseDto>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a volunteer")
    ),
    security(("bearer_auth" = [])),
    tag = "assignments"
)]
pub async fn list_assignments(
    user: AuthenticatedUser,
    State(manager): State<Arc<AssignmentManager>>,
) -> Result<Json<ApiResponse<Vec<AssignmentResponseDto>>>> {
    if !user.is_volunteer() {
        return Err(AppError::Forbidden(
            "Only volunteers can list assignments".to_string(),
        ));
    }

    let assignments = manager.list_open(&user.sub).await?;
    let total = assignments.len() as i64;
    let dtos: Vec<AssignmentResponseDto> = assignments.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::success(
        Some(dtos),
        None,
        Some(Meta { total }),
    )))
}

/// Acknowledge an assignment (pending → viewed)
#[utoipa::path(
    post,
    path = "/api/assignments/{id}/viewed",
    params(
        ("id" = Uuid, Path, description = "Assignment ID")
    ),
    responses(
        (status = 200, description = "Assignment acknowledged", body = ApiResponse<AssignmentResponseDto>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a volunteer"),
        (status = 404, description = "Assignment not found"),
        (status = 409, description = "Assignment is not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "assignments"
)]
pub async fn mark_viewed(
    user: AuthenticatedUser,
    State(manager): State<Arc<AssignmentManager>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AssignmentResponseDto>>> {
    if !user.is_volunteer() {
        return Err(AppError::Forbidden(
            "Only volunteers can acknowledge assignments".to_string(),
        ));
    }

    let assignment = manager.mark_viewed(id, &user.sub).await?;
    Ok(Json(ApiResponse::success(
        Some(assignment.into()),
        Some("Assignment acknowledged".to_string()),
        None,
    )))
}

#[cfg(test)]
mod tests {
    use axum_test::TestServer;
    use serde_json::Value;

    use super::*;
    use crate::features::assignments::routes;
    use crate::features::realtime::Fanout;
    use crate::features::reports::models::CreateReport;
    use crate::modules::coordination::MemoryCoordinationStore;
    use crate::modules::storage::{DurableStore, MemoryStore};
    use crate::shared::test_helpers::{create_volunteer_user, with_user_auth};

    async fn seeded_server(volunteer: &str) -> (Arc<MemoryStore>, Arc<AssignmentManager>, TestServer) {
        let store = Arc::new(MemoryStore::new());
        let coord = Arc::new(MemoryCoordinationStore::new());
        let fanout = Arc::new(Fanout::new(16));
        let manager = Arc::new(AssignmentManager::new(
            store.clone(),
            coord,
            fanout,
            2,
        ));
        let router = with_user_auth(
            routes::routes(manager.clone()),
            create_volunteer_user(volunteer),
        );
        (store, manager, TestServer::new(router).unwrap())
    }

    async fn seed_assignment(
        store: &Arc<MemoryStore>,
        manager: &Arc<AssignmentManager>,
        volunteer: &str,
    ) -> uuid::Uuid {
        manager.register_volunteer(volunteer).await.unwrap();
        let report = store
            .insert_report(&CreateReport {
                reporter_id: "rep-1".to_string(),
                category: "illegal-dumping".to_string(),
                lat: -7.25,
                lng: 112.75,
                image_url: "https://img.example/1.jpg".to_string(),
                image_hash: None,
                priority: 0,
            })
            .await
            .unwrap();
        let created = manager.dispatch(&report).await.unwrap();
        created[0].id
    }

    #[tokio::test]
    async fn volunteer_lists_own_open_assignments() {
        let (store, manager, server) = seeded_server("vol-a").await;
        seed_assignment(&store, &manager, "vol-a").await;

        let response = server.get("/api/assignments").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["meta"]["total"], serde_json::json!(1));
        assert_eq!(body["data"][0]["status"], serde_json::json!("pending"));
    }

    #[tokio::test]
    async fn viewed_endpoint_conflicts_on_second_call() {
        let (store, manager, server) = seeded_server("vol-a").await;
        let assignment_id = seed_assignment(&store, &manager, "vol-a").await;

        let first = server
            .post(&format!("/api/assignments/{}/viewed", assignment_id))
            .await;
        first.assert_status_ok();
        let body: Value = first.json();
        assert_eq!(body["data"]["status"], serde_json::json!("viewed"));

        let second = server
            .post(&format!("/api/assignments/{}/viewed", assignment_id))
            .await;
        second.assert_status(axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn viewed_endpoint_404s_on_unknown_assignment() {
        let (_, _, server) = seeded_server("vol-a").await;

        let response = server
            .post(&format!("/api/assignments/{}/viewed", uuid::Uuid::new_v4()))
            .await;
        response.assert_status_not_found();
    }
}
