pub mod service;
pub mod worker;

pub use service::{Discrepancy, ReconciliationService, RepairSummary};
pub use worker::ReconciliationWorker;
