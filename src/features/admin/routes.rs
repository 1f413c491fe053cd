use axum::{
    routing::{get, post, put},
    Router,
};

use crate::features::admin::handlers::{admin_handler, AdminState};

pub fn routes(state: AdminState) -> Router {
    Router::new()
        .route(
            "/api/admin/volunteers/{id}",
            put(admin_handler::register_volunteer).delete(admin_handler::unregister_volunteer),
        )
        .route("/api/admin/workload", get(admin_handler::workload_snapshot))
        .route(
            "/api/admin/reports/{id}/assignments",
            get(admin_handler::report_assignments),
        )
        .route(
            "/api/admin/reconcile/verify",
            post(admin_handler::reconcile_verify),
        )
        .route(
            "/api/admin/reconcile/repair",
            post(admin_handler::reconcile_repair),
        )
        .with_state(state)
}
