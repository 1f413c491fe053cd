use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

use crate::features::reconciliation::service::ReconciliationService;

/// Background loop that repairs drift on a fixed schedule
pub struct ReconciliationWorker {
    service: Arc<ReconciliationService>,
    period: Duration,
}

impl ReconciliationWorker {
    pub fn new(service: Arc<ReconciliationService>, period_secs: u64) -> Self {
        Self {
            service,
            period: Duration::from_secs(period_secs),
        }
    }

    pub async fn run(&self) {
        tracing::info!(period_secs = self.period.as_secs(), "Starting reconciliation worker");

        let mut interval = interval(self.period);
        // The first tick fires immediately; startup already ran a repair
        interval.tick().await;

        loop {
            interval.tick().await;

            match self.service.repair().await {
                Ok(summary) => {
                    if summary.resolved_reports > 0 || summary.expired_assignments > 0 {
                        tracing::warn!(
                            resolved = summary.resolved_reports,
                            expired = summary.expired_assignments,
                            "Reconciliation corrected drift"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!("Reconciliation pass failed: {:?}", e);
                }
            }
        }
    }
}
