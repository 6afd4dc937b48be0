use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Type};

use crate::error::AppResult;

/// Audit event type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type)]
#[sqlx(type_name = "audit_event_type", rename_all = "snake_case")]
pub enum AuditEventType {
    PayoutCreated,
    PayoutStatusChanged,
    RewardGranted,
    RewardSpent,
}

/// Append-only audit log. Records who/what with a structured JSON payload;
/// failures here surface like any other storage failure so a write is never
/// silently lost.
pub struct AuditLog {
    pub pool: PgPool,
}

impl AuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(
        &self,
        event_type: AuditEventType,
        entity_id: Option<i64>,
        user_id: Option<i64>,
        details: serde_json::Value,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (event_type, entity_id, user_id, details)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(event_type)
        .bind(entity_id)
        .bind(user_id)
        .bind(details)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
