use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};

use crate::error::{AppResult, PayoutError};

/// Payout status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payout_status", rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Rejected,
    Dispatched,
    Returned,
}

/// A computed disbursement to an instructor.
///
/// Created only by the reconciliation engine, in state `Pending`. Amount and
/// watermark are frozen at insert; only the status moves, through the
/// external approval flow.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payout {
    pub id: i64,
    pub instructor_id: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Id of the last statement included in this payout
    pub watermark: i64,
    pub status: PayoutStatus,
    pub created_at: DateTime<Utc>,
}

/// Validate payout status state machine transitions
/// Valid transitions:
/// - Pending → Approved, Rejected
/// - Approved → Dispatched
/// - Dispatched → Returned
/// - Terminal states (Rejected, Returned) → NO TRANSITIONS ALLOWED
pub fn validate_status_transition(from: PayoutStatus, to: PayoutStatus) -> AppResult<()> {
    let allowed_transitions = match from {
        PayoutStatus::Pending => vec![PayoutStatus::Approved, PayoutStatus::Rejected],
        PayoutStatus::Approved => vec![PayoutStatus::Dispatched],
        PayoutStatus::Dispatched => vec![PayoutStatus::Returned],
        PayoutStatus::Rejected | PayoutStatus::Returned => {
            return Err(PayoutError::InvalidState {
                current: format!("{:?}", from),
                expected: "No transitions from terminal states".to_string(),
            }
            .into());
        }
    };

    if !allowed_transitions.contains(&to) {
        return Err(PayoutError::InvalidState {
            current: format!("{:?}", from),
            expected: format!("{:?}", allowed_transitions),
        }
        .into());
    }

    Ok(())
}
