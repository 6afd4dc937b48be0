// Read-only reporting over the ledgers
pub mod rollup;

pub use rollup::{AnalyticsRollup, MonthlyTotal};
