use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::features::admin::{dtos as admin_dtos, handlers as admin_handlers};
use crate::features::assignments::{
    dtos as assignments_dtos, handlers as assignments_handlers,
};
use crate::features::realtime::handlers as realtime_handlers;
use crate::features::reconciliation::{Discrepancy, RepairSummary};
use crate::features::reports::{dtos as reports_dtos, handlers as reports_handlers};
use crate::features::verifications::{
    dtos as verifications_dtos, handlers as verifications_handlers, models as verifications_models,
};
use crate::modules::coordination::WorkloadSnapshot;
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Reports
        reports_handlers::report_handler::create_report,
        reports_handlers::report_handler::list_reports,
        reports_handlers::report_handler::get_report,
        // Assignments
        assignments_handlers::assignment_handler::list_assignments,
        assignments_handlers::assignment_handler::mark_viewed,
        // Verifications
        verifications_handlers::verification_handler::submit_verification,
        verifications_handlers::verification_handler::list_verifications,
        // Realtime
        realtime_handlers::stream_handler::event_stream,
        // Admin
        admin_handlers::admin_handler::register_volunteer,
        admin_handlers::admin_handler::unregister_volunteer,
        admin_handlers::admin_handler::workload_snapshot,
        admin_handlers::admin_handler::report_assignments,
        admin_handlers::admin_handler::reconcile_verify,
        admin_handlers::admin_handler::reconcile_repair,
    ),
    components(
        schemas(
            // Shared
            Meta,
            // Reports
            reports_dtos::CreateReportDto,
            reports_dtos::ReportResponseDto,
            reports_dtos::CreateReportResultDto,
            ApiResponse<reports_dtos::CreateReportResultDto>,
            ApiResponse<reports_dtos::ReportResponseDto>,
            ApiResponse<Vec<reports_dtos::ReportResponseDto>>,
            // Assignments
            assignments_dtos::AssignmentResponseDto,
            ApiResponse<assignments_dtos::AssignmentResponseDto>,
            ApiResponse<Vec<assignments_dtos::AssignmentResponseDto>>,
            // Verifications
            verifications_models::Decision,
            verifications_dtos::SubmitVerificationDto,
            verifications_dtos::VerificationResponseDto,
            verifications_dtos::SubmitResultDto,
            ApiResponse<verifications_dtos::SubmitResultDto>,
            ApiResponse<Vec<verifications_dtos::VerificationResponseDto>>,
            // Admin
            admin_dtos::UserResponseDto,
            ApiResponse<admin_dtos::UserResponseDto>,
            WorkloadSnapshot,
            ApiResponse<WorkloadSnapshot>,
            Discrepancy,
            ApiResponse<Vec<Discrepancy>>,
            RepairSummary,
            ApiResponse<RepairSummary>,
        )
    ),
    tags(
        (name = "reports", description = "Waste report submission and lookup"),
        (name = "assignments", description = "Volunteer verification assignments"),
        (name = "verifications", description = "Verification submission and history"),
        (name = "realtime", description = "Server-sent event stream for volunteers"),
        (name = "admin", description = "Volunteer roster and reconciliation (admin only)"),
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Resik API",
        version = "0.1.0",
        description = "Waste report dispatch and verification API",
    )
)]
pub struct ApiDoc;

/// Adds Bearer JWT security scheme to OpenAPI spec
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}
