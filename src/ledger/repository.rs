use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::models::{Statement, StatementDraft, StatementFilter};
use crate::error::{AppResult, LedgerError};

/// Statement ledger - the append-only source of truth for monetizable events
pub struct StatementLedger {
    pub pool: PgPool,
}

impl StatementLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one statement per draft inside the caller's transaction.
    ///
    /// Runs inside the same transaction as the business write that produced
    /// the drafts (order/enrollment creation), so a statement exists if and
    /// only if the purchase committed. A draft whose dedupe key was already
    /// used returns the stored statement instead of erroring, which makes
    /// retried purchase flows safe.
    pub async fn append_statements(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        drafts: &[StatementDraft],
    ) -> AppResult<Vec<Statement>> {
        if drafts.is_empty() {
            return Err(LedgerError::EmptyBatch.into());
        }

        let mut statements = Vec::with_capacity(drafts.len());

        for draft in drafts {
            draft.validate()?;
            let (course_id, bundle_id, product_id) = draft.subject.columns();

            let inserted = sqlx::query_as::<_, Statement>(
                r#"
                INSERT INTO statements (user_id, course_id, bundle_id, product_id, amount, order_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (user_id, order_id, COALESCE(course_id, 0), COALESCE(bundle_id, 0), COALESCE(product_id, 0))
                DO NOTHING
                RETURNING id, user_id, course_id, bundle_id, product_id, amount, order_id, created_at
                "#,
            )
            .bind(draft.user_id)
            .bind(course_id)
            .bind(bundle_id)
            .bind(product_id)
            .bind(draft.amount)
            .bind(draft.order_id)
            .fetch_optional(&mut **tx)
            .await?;

            let statement = match inserted {
                Some(statement) => statement,
                None => {
                    debug!(
                        "Statement for order {} / user {} already recorded, returning existing",
                        draft.order_id, draft.user_id
                    );
                    self.find_by_dedupe_key(tx, draft).await?
                }
            };

            statements.push(statement);
        }

        Ok(statements)
    }

    async fn find_by_dedupe_key(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        draft: &StatementDraft,
    ) -> AppResult<Statement> {
        let (course_id, bundle_id, product_id) = draft.subject.columns();

        let statement = sqlx::query_as::<_, Statement>(
            r#"
            SELECT id, user_id, course_id, bundle_id, product_id, amount, order_id, created_at
            FROM statements
            WHERE user_id = $1
              AND order_id = $2
              AND course_id IS NOT DISTINCT FROM $3
              AND bundle_id IS NOT DISTINCT FROM $4
              AND product_id IS NOT DISTINCT FROM $5
            "#,
        )
        .bind(draft.user_id)
        .bind(draft.order_id)
        .bind(course_id)
        .bind(bundle_id)
        .bind(product_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(statement)
    }

    /// Read-only listing for the dashboard collaborator. NULL filter fields
    /// do not constrain; a NULL limit means no limit.
    pub async fn list_statements(&self, filter: &StatementFilter) -> AppResult<Vec<Statement>> {
        let statements = sqlx::query_as::<_, Statement>(
            r#"
            SELECT id, user_id, course_id, bundle_id, product_id, amount, order_id, created_at
            FROM statements
            WHERE ($1::BIGINT IS NULL OR user_id = $1)
              AND ($2::BIGINT IS NULL OR course_id = $2)
              AND ($3::BIGINT IS NULL OR bundle_id = $3)
              AND ($4::BIGINT IS NULL OR product_id = $4)
              AND ($5::BIGINT IS NULL OR id > $5)
            ORDER BY id
            LIMIT $6
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.course_id)
        .bind(filter.bundle_id)
        .bind(filter.product_id)
        .bind(filter.after_id)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(statements)
    }

    pub async fn begin_tx(&self) -> AppResult<Transaction<'_, Postgres>> {
        Ok(self.pool.begin().await?)
    }
}
