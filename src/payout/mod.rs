// Payout reconciliation
pub mod engine;
pub mod models;
pub mod scheduler;

pub use engine::{PayoutConfig, PayoutEngine};
pub use models::{Payout, PayoutStatus};
pub use scheduler::{PayoutFrequency, PayoutScheduleConfig, PayoutScheduler};
