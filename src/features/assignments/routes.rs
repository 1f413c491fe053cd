use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::features::assignments::handlers::assignment_handler;
use crate::features::assignments::services::AssignmentManager;

pub fn routes(manager: Arc<AssignmentManager>) -> Router {
    Router::new()
        .route("/api/assignments", get(assignment_handler::list_assignments))
        .route(
            "/api/assignments/{id}/viewed",
            post(assignment_handler::mark_viewed),
        )
        .with_state(manager)
}
