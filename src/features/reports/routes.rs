use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::features::reports::handlers::report_handler;
use crate::features::reports::services::ReportService;

pub fn routes(service: Arc<ReportService>) -> Router {
    Router::new()
        .route("/api/reports", post(report_handler::create_report))
        .route("/api/reports", get(report_handler::list_reports))
        .route("/api/reports/{id}", get(report_handler::get_report))
        .with_state(service)
}
