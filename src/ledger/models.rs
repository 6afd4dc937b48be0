use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::error::{AppResult, LedgerError};

/// What a statement was paid for. Exactly one subject per statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Subject {
    Course(i64),
    Bundle(i64),
    Product(i64),
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Course(_) => "course",
            Subject::Bundle(_) => "bundle",
            Subject::Product(_) => "product",
        }
    }

    /// Split into the three nullable foreign-key columns of the statements table.
    pub fn columns(&self) -> (Option<i64>, Option<i64>, Option<i64>) {
        match *self {
            Subject::Course(id) => (Some(id), None, None),
            Subject::Bundle(id) => (None, Some(id), None),
            Subject::Product(id) => (None, None, Some(id)),
        }
    }
}

/// One monetizable purchase event, not yet persisted.
///
/// The `(user_id, subject, order_id)` triple is the dedupe key: a retried
/// purchase flow re-submitting the same draft gets the already-stored
/// statement back instead of a duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementDraft {
    pub user_id: i64,
    pub subject: Subject,
    pub amount: Decimal,
    pub order_id: Uuid,
}

impl StatementDraft {
    pub fn validate(&self) -> AppResult<()> {
        if self.amount < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount {
                amount: self.amount,
            }
            .into());
        }
        Ok(())
    }
}

/// An immutable ledger entry. Never updated or deleted after insert; the id
/// is assigned by the store and totally ordered within an instructor's
/// statements, which is what the payout watermark compares against.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Statement {
    pub id: i64,
    pub user_id: i64,
    pub course_id: Option<i64>,
    pub bundle_id: Option<i64>,
    pub product_id: Option<i64>,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub order_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Statement {
    pub fn subject(&self) -> Option<Subject> {
        match (self.course_id, self.bundle_id, self.product_id) {
            (Some(id), None, None) => Some(Subject::Course(id)),
            (None, Some(id), None) => Some(Subject::Bundle(id)),
            (None, None, Some(id)) => Some(Subject::Product(id)),
            _ => None,
        }
    }
}

/// Filter for read-only statement listings. Unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct StatementFilter {
    pub user_id: Option<i64>,
    pub course_id: Option<i64>,
    pub bundle_id: Option<i64>,
    pub product_id: Option<i64>,
    /// Only statements with id strictly greater than this
    pub after_id: Option<i64>,
    pub limit: Option<i64>,
}
