// Append-only statement ledger
pub mod models;
pub mod repository;

pub use models::{Statement, StatementDraft, StatementFilter, Subject};
pub use repository::StatementLedger;
