use rust_decimal::Decimal;
use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Top-level error type for the entire crate
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Payout error: {0}")]
    Payout(#[from] PayoutError),

    #[error("Reward error: {0}")]
    Reward(#[from] RewardError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Statement ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Statement batch is empty")]
    EmptyBatch,

    #[error("Statement amount cannot be negative: {amount}")]
    NegativeAmount { amount: Decimal },
}

/// Payout reconciliation errors
#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("Payout computation for instructor {instructor_id} conflicted {attempts} times, retry later")]
    ConflictRetriesExhausted { instructor_id: i64, attempts: u32 },

    #[error("Payout in invalid state: {current}, expected: {expected}")]
    InvalidState { current: String, expected: String },
}

/// Reward point errors
#[derive(Error, Debug)]
pub enum RewardError {
    #[error("Insufficient reward balance: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("Spend amount must be positive: {points}")]
    NonPositiveSpend { points: i64 },
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

/// SQLSTATE codes PostgreSQL raises when a transaction lost a race and
/// should be retried from scratch (serialization failure, deadlock).
pub fn is_conflict_sqlstate(code: &str) -> bool {
    matches!(code, "40001" | "40P01")
}

/// Whether an error is a transient commit conflict worth retrying.
pub fn is_retryable_conflict(error: &AppError) -> bool {
    match error {
        AppError::Database(sqlx::Error::Database(db)) => db
            .code()
            .map(|code| is_conflict_sqlstate(&code))
            .unwrap_or(false),
        _ => false,
    }
}

/// Result type alias for the crate
pub type AppResult<T> = Result<T, AppError>;
