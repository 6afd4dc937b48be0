use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::catalog::ConditionCatalog;
use super::models::{EntryType, RewardEntry};
use crate::audit::{AuditEventType, AuditLog};
use crate::error::{AppError, AppResult, RewardError};

/// Reward points service.
///
/// Earn entries are written by the triggering business flows; spend entries
/// come from store checkout. Idempotency of one-shot conditions rides on the
/// reward_awards primary key, not on any in-process state.
pub struct RewardService {
    pool: PgPool,
    catalog: Arc<ConditionCatalog>,
    audit: Arc<AuditLog>,
}

impl RewardService {
    pub fn new(pool: PgPool, catalog: Arc<ConditionCatalog>, audit: Arc<AuditLog>) -> Self {
        Self {
            pool,
            catalog,
            audit,
        }
    }

    /// Award points for a qualifying action.
    ///
    /// A missing or inactive condition is a silent no-op. For a
    /// non-repeatable condition the `(user, key, subject)` award row is
    /// claimed in the same transaction as the entry; losing that claim means
    /// "already awarded" and the prior entry is returned.
    pub async fn give_reward_points(
        &self,
        user_id: i64,
        condition_key: &str,
        subject_id: Option<i64>,
    ) -> AppResult<Option<RewardEntry>> {
        let Some(condition) = self.catalog.get(condition_key) else {
            debug!("Reward condition {} not in catalog, skipping", condition_key);
            return Ok(None);
        };

        if !condition.active {
            debug!("Reward condition {} is inactive, skipping", condition_key);
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;

        let entry = self
            .insert_earn_entry(&mut tx, user_id, condition.points, condition_key, subject_id)
            .await?;

        if !condition.repeatable {
            let claimed = sqlx::query(
                r#"
                INSERT INTO reward_awards (user_id, condition_key, subject_id, entry_id)
                VALUES ($1, $2, COALESCE($3, 0), $4)
                ON CONFLICT (user_id, condition_key, subject_id) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(condition_key)
            .bind(subject_id)
            .bind(entry.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if claimed == 0 {
                // Already awarded; discard this entry and hand back the one
                // the earlier call recorded.
                tx.rollback().await?;
                debug!(
                    "Reward {} already awarded to user {} (subject {:?})",
                    condition_key, user_id, subject_id
                );
                return Ok(Some(self.prior_award(user_id, condition_key, subject_id).await?));
            }
        }

        tx.commit().await?;

        self.audit
            .record(
                AuditEventType::RewardGranted,
                Some(entry.id),
                Some(user_id),
                serde_json::json!({
                    "condition": condition_key,
                    "points": condition.points,
                    "subject_id": subject_id,
                }),
            )
            .await?;

        Ok(Some(entry))
    }

    async fn insert_earn_entry(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        points: i64,
        condition_key: &str,
        subject_id: Option<i64>,
    ) -> AppResult<RewardEntry> {
        let entry = sqlx::query_as::<_, RewardEntry>(
            r#"
            INSERT INTO reward_points (user_id, entry_type, points, reason, condition_key, subject_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, entry_type, points, reason, condition_key, subject_id, created_at
            "#,
        )
        .bind(user_id)
        .bind(EntryType::Earn)
        .bind(points)
        .bind(condition_key)
        .bind(condition_key)
        .bind(subject_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(entry)
    }

    async fn prior_award(
        &self,
        user_id: i64,
        condition_key: &str,
        subject_id: Option<i64>,
    ) -> AppResult<RewardEntry> {
        let entry = sqlx::query_as::<_, RewardEntry>(
            r#"
            SELECT e.id, e.user_id, e.entry_type, e.points, e.reason, e.condition_key, e.subject_id, e.created_at
            FROM reward_points e
            JOIN reward_awards a ON a.entry_id = e.id
            WHERE a.user_id = $1 AND a.condition_key = $2 AND a.subject_id = COALESCE($3, 0)
            "#,
        )
        .bind(user_id)
        .bind(condition_key)
        .bind(subject_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Redeem points at checkout.
    ///
    /// The balance check and the spent entry go through one transaction
    /// holding the user row lock, so two concurrent spends cannot both pass
    /// the check and drive the balance negative.
    pub async fn spend_reward_points(
        &self,
        user_id: i64,
        points: i64,
        reason: &str,
    ) -> AppResult<RewardEntry> {
        if points <= 0 {
            return Err(RewardError::NonPositiveSpend { points }.into());
        }

        let mut tx = self.pool.begin().await?;

        let user: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM users WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if user.is_none() {
            return Err(AppError::NotFound(format!("User not found: {}", user_id)));
        }

        let available = Self::balance_in(&mut tx, user_id).await?;
        if available < points {
            return Err(RewardError::InsufficientBalance {
                required: points,
                available,
            }
            .into());
        }

        let entry = sqlx::query_as::<_, RewardEntry>(
            r#"
            INSERT INTO reward_points (user_id, entry_type, points, reason)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, entry_type, points, reason, condition_key, subject_id, created_at
            "#,
        )
        .bind(user_id)
        .bind(EntryType::Spent)
        .bind(points)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.audit
            .record(
                AuditEventType::RewardSpent,
                Some(entry.id),
                Some(user_id),
                serde_json::json!({
                    "points": points,
                    "reason": reason,
                }),
            )
            .await?;

        Ok(entry)
    }

    /// Current balance: Σ earn − Σ spent over all entries for the user.
    pub async fn balance(&self, user_id: i64) -> AppResult<i64> {
        let balance: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE WHEN entry_type = 'earn' THEN points ELSE -points END), 0)::BIGINT
            FROM reward_points
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(balance)
    }

    async fn balance_in(tx: &mut Transaction<'_, Postgres>, user_id: i64) -> AppResult<i64> {
        let balance: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE WHEN entry_type = 'earn' THEN points ELSE -points END), 0)::BIGINT
            FROM reward_points
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(balance)
    }

    /// Full entry history for a user, oldest first.
    pub async fn history(&self, user_id: i64) -> AppResult<Vec<RewardEntry>> {
        let entries = sqlx::query_as::<_, RewardEntry>(
            r#"
            SELECT id, user_id, entry_type, points, reason, condition_key, subject_id, created_at
            FROM reward_points
            WHERE user_id = $1
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
