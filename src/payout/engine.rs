use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tracing::{info, warn};

use super::models::{validate_status_transition, Payout, PayoutStatus};
use crate::audit::{AuditEventType, AuditLog};
use crate::error::{is_retryable_conflict, AppResult, PayoutError};

/// Payout engine configuration
#[derive(Debug, Clone)]
pub struct PayoutConfig {
    /// How many times a conflicted computation is retried before giving up
    pub max_conflict_retries: u32,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
        }
    }
}

/// Payout reconciliation engine.
///
/// Converts unpaid statements into instructor payouts using the
/// per-instructor watermark cursor. All mutual exclusion lives in the store
/// (row lock on the cursor), so any number of service instances can invoke
/// the engine concurrently; two computations for the same instructor
/// serialize, and the second one computes against the first one's watermark.
pub struct PayoutEngine {
    config: PayoutConfig,
    pool: PgPool,
    audit: Arc<AuditLog>,
}

impl PayoutEngine {
    pub fn new(config: PayoutConfig, pool: PgPool, audit: Arc<AuditLog>) -> Self {
        Self {
            config,
            pool,
            audit,
        }
    }

    /// Compute the next payout for an instructor.
    ///
    /// Returns `Ok(None)` when every attributable statement is already
    /// covered by a prior watermark; no zero-amount payout row is created.
    /// A computation that lost a serialization race is retried from the
    /// fresh cursor state up to the configured bound.
    pub async fn compute_payout(&self, instructor_id: i64) -> AppResult<Option<Payout>> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.try_compute(instructor_id).await {
                Ok(Some(payout)) => {
                    info!(
                        "Payout {} created for instructor {}: amount {}, watermark {}",
                        payout.id, instructor_id, payout.amount, payout.watermark
                    );
                    self.audit
                        .record(
                            AuditEventType::PayoutCreated,
                            Some(payout.id),
                            None,
                            serde_json::json!({
                                "instructor_id": instructor_id,
                                "amount": payout.amount.to_string(),
                                "watermark": payout.watermark,
                            }),
                        )
                        .await?;
                    return Ok(Some(payout));
                }
                Ok(None) => return Ok(None),
                Err(err) if is_retryable_conflict(&err) => {
                    if attempt > self.config.max_conflict_retries {
                        return Err(PayoutError::ConflictRetriesExhausted {
                            instructor_id,
                            attempts: attempt,
                        }
                        .into());
                    }
                    warn!(
                        "Payout computation for instructor {} lost a commit race (attempt {}), retrying",
                        instructor_id, attempt
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One computation attempt, entirely inside a single transaction.
    async fn try_compute(&self, instructor_id: i64) -> AppResult<Option<Payout>> {
        let mut tx = self.pool.begin().await?;

        // The cursor row is created lazily at watermark 0 on first contact.
        sqlx::query(
            r#"
            INSERT INTO payout_cursors (instructor_id, watermark)
            VALUES ($1, 0)
            ON CONFLICT (instructor_id) DO NOTHING
            "#,
        )
        .bind(instructor_id)
        .execute(&mut *tx)
        .await?;

        // Exclusive lock scoped to this instructor; computations for
        // different instructors never contend.
        let watermark: i64 = sqlx::query_scalar(
            r#"
            SELECT watermark FROM payout_cursors
            WHERE instructor_id = $1
            FOR UPDATE
            "#,
        )
        .bind(instructor_id)
        .fetch_one(&mut *tx)
        .await?;

        // Statements are attributed through current course/bundle ownership
        // at computation time. Product statements have no owning instructor
        // and stay with the platform.
        let row = sqlx::query(
            r#"
            SELECT MAX(s.id) AS new_watermark, COALESCE(SUM(s.amount), 0) AS total
            FROM statements s
            LEFT JOIN courses c ON s.course_id = c.id
            LEFT JOIN bundles b ON s.bundle_id = b.id
            WHERE (c.instructor_id = $1 OR b.instructor_id = $1)
              AND s.id > $2
            "#,
        )
        .bind(instructor_id)
        .bind(watermark)
        .fetch_one(&mut *tx)
        .await?;

        let new_watermark: Option<i64> = row.try_get("new_watermark")?;
        let Some(new_watermark) = new_watermark else {
            tx.rollback().await?;
            return Ok(None);
        };
        let amount: Decimal = row.try_get("total")?;

        let payout = sqlx::query_as::<_, Payout>(
            r#"
            INSERT INTO payouts (instructor_id, amount, watermark)
            VALUES ($1, $2, $3)
            RETURNING id, instructor_id, amount, watermark, status, created_at
            "#,
        )
        .bind(instructor_id)
        .bind(amount)
        .bind(new_watermark)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE payout_cursors
            SET watermark = $2
            WHERE instructor_id = $1
            "#,
        )
        .bind(instructor_id)
        .bind(new_watermark)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(payout))
    }

    /// Instructors with at least one statement beyond their cursor. Drives
    /// the scheduled payout job.
    pub async fn payable_instructors(&self) -> AppResult<Vec<i64>> {
        let instructors = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT o.instructor_id
            FROM (
                SELECT c.instructor_id, s.id FROM statements s JOIN courses c ON s.course_id = c.id
                UNION ALL
                SELECT b.instructor_id, s.id FROM statements s JOIN bundles b ON s.bundle_id = b.id
            ) o
            LEFT JOIN payout_cursors pc ON pc.instructor_id = o.instructor_id
            WHERE o.id > COALESCE(pc.watermark, 0)
            ORDER BY o.instructor_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(instructors)
    }

    /// Apply an approval-flow status transition.
    ///
    /// Compare-and-set on the current status, so a stale admin action fails
    /// instead of overwriting a concurrent transition.
    pub async fn update_status(
        &self,
        payout_id: i64,
        from_status: PayoutStatus,
        to_status: PayoutStatus,
    ) -> AppResult<()> {
        validate_status_transition(from_status, to_status)?;

        let result = sqlx::query(
            r#"
            UPDATE payouts
            SET status = $3
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(payout_id)
        .bind(from_status)
        .bind(to_status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PayoutError::InvalidState {
                current: "unknown".to_string(),
                expected: format!("{:?}", from_status),
            }
            .into());
        }

        self.audit
            .record(
                AuditEventType::PayoutStatusChanged,
                Some(payout_id),
                None,
                serde_json::json!({
                    "from": from_status,
                    "to": to_status,
                }),
            )
            .await?;

        Ok(())
    }

    /// Most recent payout for an instructor, if any.
    pub async fn latest_payout(&self, instructor_id: i64) -> AppResult<Option<Payout>> {
        let payout = sqlx::query_as::<_, Payout>(
            r#"
            SELECT id, instructor_id, amount, watermark, status, created_at
            FROM payouts
            WHERE instructor_id = $1
            ORDER BY watermark DESC
            LIMIT 1
            "#,
        )
        .bind(instructor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payout)
    }
}
