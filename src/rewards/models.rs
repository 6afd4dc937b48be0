use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};

/// Entry type enum - the two sides of the reward points ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "reward_entry_type", rename_all = "lowercase")]
pub enum EntryType {
    Earn,
    Spent,
}

/// Catalog entry describing when and how an action pays points.
///
/// Non-repeatable conditions pay a user at most once per distinct subject;
/// repeatable ones pay on every qualifying occurrence. Toggling `active`
/// never touches already-recorded entries.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RewardCondition {
    pub key: String,
    pub points: i64,
    pub active: bool,
    pub repeatable: bool,
}

/// One append-only reward points entry.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RewardEntry {
    pub id: i64,
    pub user_id: i64,
    pub entry_type: EntryType,
    pub points: i64,
    pub reason: String,
    pub condition_key: Option<String>,
    pub subject_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl RewardEntry {
    /// Points with the sign of the entry type.
    pub fn signed_points(&self) -> i64 {
        match self.entry_type {
            EntryType::Earn => self.points,
            EntryType::Spent => -self.points,
        }
    }
}

/// Balance over a slice of entries: Σ earn − Σ spent.
pub fn balance_of(entries: &[RewardEntry]) -> i64 {
    entries.iter().map(RewardEntry::signed_points).sum()
}
