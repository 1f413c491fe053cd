// =============================================================================
// ROLE CONSTANTS
// =============================================================================

/// Volunteer role - receives dispatched reports and submits verifications
pub const ROLE_VOLUNTEER: &str = "volunteer";

/// Reporter role - submits waste reports
pub const ROLE_REPORTER: &str = "reporter";

/// Admin role - role management, diagnostics and reconciliation tooling
pub const ROLE_ADMIN: &str = "admin";
