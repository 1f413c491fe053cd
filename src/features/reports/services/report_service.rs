use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::assignments::services::AssignmentManager;
use crate::features::reports::dtos::CreateReportDto;
use crate::features::reports::models::{CreateReport, Report};
use crate::modules::storage::DurableStore;

/// Report intake: duplicate suppression, durable insert, then dispatch.
pub struct ReportService {
    store: Arc<dyn DurableStore>,
    manager: Arc<AssignmentManager>,
    duplicate_window: Duration,
}

impl ReportService {
    pub fn new(
        store: Arc<dyn DurableStore>,
        manager: Arc<AssignmentManager>,
        duplicate_window_secs: u64,
    ) -> Self {
        Self {
            store,
            manager,
            duplicate_window: Duration::seconds(duplicate_window_secs as i64),
        }
    }

    /// Create a report for the given reporter.
    ///
    /// When the submission carries an image hash already seen inside the
    /// duplicate window, the existing report is returned and nothing new is
    /// created or dispatched. Dispatch failures do not fail the creation;
    /// the report stays pending and reconciliation or a later manual pass
    /// picks it up.
    pub async fn create(&self, reporter_id: &str, dto: &CreateReportDto) -> Result<(Report, bool)> {
        if let Some(hash) = dto.image_hash.as_deref() {
            let since = Utc::now() - self.duplicate_window;
            if let Some(existing) = self.store.find_recent_duplicate(hash, since).await? {
                tracing::info!(
                    report_id = %existing.id,
                    "Duplicate submission suppressed by image hash"
                );
                return Ok((existing, true));
            }
        }

        let report = self
            .store
            .insert_report(&CreateReport {
                reporter_id: reporter_id.to_string(),
                category: dto.category.clone(),
                lat: dto.lat,
                lng: dto.lng,
                image_url: dto.image_url.clone(),
                image_hash: dto.image_hash.clone(),
                priority: dto.priority,
            })
            .await?;

        if let Err(e) = self.manager.dispatch(&report).await {
            tracing::error!(report_id = %report.id, "Dispatch failed after creation: {}", e);
        }

        // Re-read so assigned_count reflects the dispatch
        let report = self
            .store
            .get_report(report.id)
            .await?
            .unwrap_or(report);
        Ok((report, false))
    }

    pub async fn get(&self, id: Uuid) -> Result<Report> {
        self.store
            .get_report(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Report {} not found", id)))
    }

    pub async fn list_by_reporter(&self, reporter_id: &str) -> Result<Vec<Report>> {
        self.store.list_reports_by_reporter(reporter_id).await
    }
}
