// Reward points ledger and condition catalog
pub mod catalog;
pub mod models;
pub mod service;

pub use catalog::{condition_keys, ConditionCatalog};
pub use models::{balance_of, EntryType, RewardCondition, RewardEntry};
pub use service::RewardService;
