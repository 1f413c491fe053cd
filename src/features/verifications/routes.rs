use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::features::verifications::handlers::verification_handler;
use crate::features::verifications::services::VerificationResolver;

pub fn routes(resolver: Arc<VerificationResolver>) -> Router {
    Router::new()
        .route(
            "/api/reports/{id}/verifications",
            post(verification_handler::submit_verification),
        )
        .route(
            "/api/reports/{id}/verifications",
            get(verification_handler::list_verifications),
        )
        .with_state(resolver)
}
