use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::admin::models::User;
use crate::features::assignments::models::Assignment;
use crate::features::reports::models::{CreateReport, Report};
use crate::features::verifications::models::{Decision, NewVerification, Verification};

use super::{status_for, DurableStore, ResolveOutcome};

const REPORT_COLUMNS: &str = "id, reporter_id, category, lat, lng, image_url, image_hash, \
     status, assigned_count, priority, remarks, verified_by, verified_at, created_at, updated_at";

const ASSIGNMENT_COLUMNS: &str =
    "id, report_id, volunteer_id, status, assigned_at, updated_at";

const VERIFICATION_COLUMNS: &str = "id, report_id, volunteer_id, decision, note, created_at";

/// PostgreSQL-backed durable store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DurableStore for PgStore {
    async fn insert_report(&self, data: &CreateReport) -> Result<Report> {
        let report = sqlx::query_as::<_, Report>(&format!(
            r#"
            INSERT INTO reports (reporter_id, category, lat, lng, image_url, image_hash, priority)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {REPORT_COLUMNS}
            "#
        ))
        .bind(&data.reporter_id)
        .bind(&data.category)
        .bind(data.lat)
        .bind(data.lng)
        .bind(&data.image_url)
        .bind(&data.image_hash)
        .bind(data.priority)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert report: {:?}", e);
            AppError::Database(e)
        })?;

        tracing::info!(
            "Created report {} ({}) by {}",
            report.id,
            report.category,
            report.reporter_id
        );

        Ok(report)
    }

    async fn get_report(&self, id: Uuid) -> Result<Option<Report>> {
        sqlx::query_as::<_, Report>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get report: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn list_reports_by_reporter(&self, reporter_id: &str) -> Result<Vec<Report>> {
        sqlx::query_as::<_, Report>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE reporter_id = $1 ORDER BY created_at DESC"
        ))
        .bind(reporter_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list reports by reporter: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn find_recent_duplicate(
        &self,
        image_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Report>> {
        sqlx::query_as::<_, Report>(&format!(
            r#"
            SELECT {REPORT_COLUMNS} FROM reports
            WHERE image_hash = $1 AND created_at >= $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(image_hash)
        .bind(since)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to look up duplicate report: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn add_assigned_count(&self, report_id: Uuid, delta: i32) -> Result<()> {
        sqlx::query(
            "UPDATE reports SET assigned_count = assigned_count + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(report_id)
        .bind(delta)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update assigned count: {:?}", e);
            AppError::Database(e)
        })?;

        Ok(())
    }

    async fn insert_assignment(&self, report_id: Uuid, volunteer_id: &str) -> Result<Assignment> {
        let assignment = sqlx::query_as::<_, Assignment>(&format!(
            r#"
            INSERT INTO assignments (report_id, volunteer_id)
            VALUES ($1, $2)
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        ))
        .bind(report_id)
        .bind(volunteer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                "Failed to insert assignment for report {} volunteer {}: {:?}",
                report_id,
                volunteer_id,
                e
            );
            AppError::Database(e)
        })?;

        tracing::info!(
            "Assigned report {} to volunteer {}",
            report_id,
            volunteer_id
        );

        Ok(assignment)
    }

    async fn mark_assignment_viewed(
        &self,
        assignment_id: Uuid,
        volunteer_id: &str,
    ) -> Result<Assignment> {
        let updated = sqlx::query_as::<_, Assignment>(&format!(
            r#"
            UPDATE assignments SET status = 'viewed', updated_at = NOW()
            WHERE id = $1 AND volunteer_id = $2 AND status = 'pending'
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        ))
        .bind(assignment_id)
        .bind(volunteer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to mark assignment viewed: {:?}", e);
            AppError::Database(e)
        })?;

        if let Some(assignment) = updated {
            return Ok(assignment);
        }

        // Distinguish a missing assignment from one in the wrong state
        let existing = sqlx::query_as::<_, Assignment>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = $1 AND volunteer_id = $2"
        ))
        .bind(assignment_id)
        .bind(volunteer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        match existing {
            Some(a) => Err(AppError::InvalidTransition(format!(
                "Assignment {} is {}, expected pending",
                assignment_id, a.status
            ))),
            None => Err(AppError::NotFound(format!(
                "Assignment {} not found",
                assignment_id
            ))),
        }
    }

    async fn open_assignment(
        &self,
        report_id: Uuid,
        volunteer_id: &str,
    ) -> Result<Option<Assignment>> {
        sqlx::query_as::<_, Assignment>(&format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS} FROM assignments
            WHERE report_id = $1 AND volunteer_id = $2 AND status IN ('pending', 'viewed')
            "#
        ))
        .bind(report_id)
        .bind(volunteer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get open assignment: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn open_assignments_for_report(&self, report_id: Uuid) -> Result<Vec<Assignment>> {
        sqlx::query_as::<_, Assignment>(&format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS} FROM assignments
            WHERE report_id = $1 AND status IN ('pending', 'viewed')
            ORDER BY assigned_at ASC
            "#
        ))
        .bind(report_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list open assignments for report: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn open_assignments_for_volunteer(&self, volunteer_id: &str) -> Result<Vec<Assignment>> {
        sqlx::query_as::<_, Assignment>(&format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS} FROM assignments
            WHERE volunteer_id = $1 AND status IN ('pending', 'viewed')
            ORDER BY assigned_at ASC
            "#
        ))
        .bind(volunteer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list open assignments for volunteer: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn insert_verification(&self, data: &NewVerification) -> Result<Verification> {
        let verification = sqlx::query_as::<_, Verification>(&format!(
            r#"
            INSERT INTO verifications (report_id, volunteer_id, decision, note)
            VALUES ($1, $2, $3, $4)
            RETURNING {VERIFICATION_COLUMNS}
            "#
        ))
        .bind(data.report_id)
        .bind(&data.volunteer_id)
        .bind(data.decision)
        .bind(&data.note)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert verification: {:?}", e);
            AppError::Database(e)
        })?;

        Ok(verification)
    }

    async fn verifications_for_report(&self, report_id: Uuid) -> Result<Vec<Verification>> {
        sqlx::query_as::<_, Verification>(&format!(
            r#"
            SELECT {VERIFICATION_COLUMNS} FROM verifications
            WHERE report_id = $1
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(report_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list verifications: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn resolve_if_pending(
        &self,
        report_id: Uuid,
        volunteer_id: &str,
        decision: Decision,
        note: Option<&str>,
    ) -> Result<ResolveOutcome> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        // The conditional update is the serialization point: the first
        // transaction to flip the status away from pending wins.
        let updated = sqlx::query(
            r#"
            UPDATE reports
            SET status = $2, verified_by = $3, verified_at = NOW(),
                remarks = COALESCE($4, remarks), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(report_id)
        .bind(status_for(decision))
        .bind(volunteer_id)
        .bind(note)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed conditional report update: {:?}", e);
            AppError::Database(e)
        })?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(AppError::Database)?;
            return Ok(ResolveOutcome {
                applied: false,
                released: Vec::new(),
            });
        }

        let mut released = sqlx::query_as::<_, Assignment>(&format!(
            r#"
            UPDATE assignments SET status = 'completed', updated_at = NOW()
            WHERE report_id = $1 AND volunteer_id = $2 AND status IN ('pending', 'viewed')
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        ))
        .bind(report_id)
        .bind(volunteer_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        let expired = sqlx::query_as::<_, Assignment>(&format!(
            r#"
            UPDATE assignments SET status = 'expired', updated_at = NOW()
            WHERE report_id = $1 AND status IN ('pending', 'viewed')
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        ))
        .bind(report_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        released.extend(expired);

        tx.commit().await.map_err(AppError::Database)?;

        tracing::info!(
            "Report {} resolved as {} by {} ({} assignments released)",
            report_id,
            decision,
            volunteer_id,
            released.len()
        );

        Ok(ResolveOutcome {
            applied: true,
            released,
        })
    }

    async fn upsert_user_role(&self, user_id: &str, role: &str) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, role)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET role = $2, updated_at = NOW()
            RETURNING id, display_name, role, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to upsert user role: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn volunteer_ids(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT id FROM users WHERE role = 'volunteer' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list volunteer ids: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn resolved_reports_with_open_assignments(&self) -> Result<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT DISTINCT r.id
            FROM reports r
            JOIN assignments a ON a.report_id = r.id
            WHERE r.status <> 'pending' AND a.status IN ('pending', 'viewed')
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed resolved-with-open query: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn expire_open_assignments(&self, report_id: Uuid) -> Result<Vec<Assignment>> {
        sqlx::query_as::<_, Assignment>(&format!(
            r#"
            UPDATE assignments SET status = 'expired', updated_at = NOW()
            WHERE report_id = $1 AND status IN ('pending', 'viewed')
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        ))
        .bind(report_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to expire open assignments: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn pending_reports_with_earliest_verification(&self) -> Result<Vec<Verification>> {
        sqlx::query_as::<_, Verification>(
            r#"
            SELECT DISTINCT ON (v.report_id)
                v.id, v.report_id, v.volunteer_id, v.decision, v.note, v.created_at
            FROM verifications v
            JOIN reports r ON r.id = v.report_id
            WHERE r.status = 'pending'
            ORDER BY v.report_id, v.created_at ASC, v.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed pending-with-verification query: {:?}", e);
            AppError::Database(e)
        })
    }

    async fn open_assignment_counts(&self) -> Result<BTreeMap<String, i64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT volunteer_id, COUNT(*)
            FROM assignments
            WHERE status IN ('pending', 'viewed')
            GROUP BY volunteer_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed open-assignment-counts query: {:?}", e);
            AppError::Database(e)
        })?;

        Ok(rows.into_iter().collect())
    }

    async fn open_reports_by_volunteer(&self) -> Result<BTreeMap<String, BTreeSet<Uuid>>> {
        let rows = sqlx::query_as::<_, (String, Uuid)>(
            r#"
            SELECT volunteer_id, report_id
            FROM assignments
            WHERE status IN ('pending', 'viewed')
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed open-reports-by-volunteer query: {:?}", e);
            AppError::Database(e)
        })?;

        let mut held: BTreeMap<String, BTreeSet<Uuid>> = BTreeMap::new();
        for (volunteer_id, report_id) in rows {
            held.entry(volunteer_id).or_default().insert(report_id);
        }

        Ok(held)
    }
}
