pub mod admin;
pub mod assignments;
pub mod auth;
pub mod realtime;
pub mod reconciliation;
pub mod reports;
pub mod verifications;
