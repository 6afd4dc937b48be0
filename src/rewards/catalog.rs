use std::collections::HashMap;

use parking_lot::RwLock;
use sqlx::PgPool;
use tracing::info;

use super::models::RewardCondition;
use crate::error::{AppError, AppResult};

/// Stable condition keys known to the triggering flows. The catalog itself
/// is data-driven, so a new key is seed data, not a code change.
pub mod condition_keys {
    pub const REGISTRATION: &str = "Registration";
    pub const FORUM_THREAD: &str = "ForumThread";
    pub const FORUM_REPLY: &str = "ForumReply";
    pub const ASSIGNMENT_GRADED: &str = "AssignmentGraded";
    pub const COURSE_COMPLETION: &str = "CourseCompletion";
    pub const REVIEW_SUBMITTED: &str = "ReviewSubmitted";
    pub const CERTIFICATE_ISSUED: &str = "CertificateIssued";
}

/// In-memory reward condition catalog, keyed by the stable condition key.
///
/// Constructed once at startup from the reward_conditions table and passed
/// to the components that need it. Admin toggles persist first, then update
/// the table here; recorded entries are never rewritten.
pub struct ConditionCatalog {
    conditions: RwLock<HashMap<String, RewardCondition>>,
}

impl ConditionCatalog {
    pub fn new(conditions: Vec<RewardCondition>) -> Self {
        let map = conditions
            .into_iter()
            .map(|condition| (condition.key.clone(), condition))
            .collect();
        Self {
            conditions: RwLock::new(map),
        }
    }

    /// Load the catalog from the store.
    pub async fn load(pool: &PgPool) -> AppResult<Self> {
        let conditions = Self::fetch_all(pool).await?;
        info!("Loaded {} reward conditions", conditions.len());
        Ok(Self::new(conditions))
    }

    async fn fetch_all(pool: &PgPool) -> AppResult<Vec<RewardCondition>> {
        let conditions = sqlx::query_as::<_, RewardCondition>(
            r#"
            SELECT key, points, active, repeatable
            FROM reward_conditions
            ORDER BY key
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(conditions)
    }

    pub fn get(&self, key: &str) -> Option<RewardCondition> {
        self.conditions.read().get(key).cloned()
    }

    /// Admin toggle. Persists, then updates the in-memory table.
    pub async fn set_active(&self, pool: &PgPool, key: &str, active: bool) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE reward_conditions
            SET active = $2
            WHERE key = $1
            "#,
        )
        .bind(key)
        .bind(active)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Reward condition: {}", key)));
        }

        if let Some(condition) = self.conditions.write().get_mut(key) {
            condition.active = active;
        }

        info!("Reward condition {} set active={}", key, active);
        Ok(())
    }

    /// Re-read the whole catalog, picking up conditions added out of band.
    pub async fn reload(&self, pool: &PgPool) -> AppResult<()> {
        let conditions = Self::fetch_all(pool).await?;
        let map = conditions
            .into_iter()
            .map(|condition| (condition.key.clone(), condition))
            .collect();
        *self.conditions.write() = map;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ConditionCatalog {
        ConditionCatalog::new(vec![
            RewardCondition {
                key: condition_keys::REGISTRATION.to_string(),
                points: 50,
                active: true,
                repeatable: false,
            },
            RewardCondition {
                key: condition_keys::FORUM_REPLY.to_string(),
                points: 5,
                active: false,
                repeatable: true,
            },
        ])
    }

    #[test]
    fn test_lookup_by_key() {
        let catalog = catalog();

        let registration = catalog.get(condition_keys::REGISTRATION).unwrap();
        assert_eq!(registration.points, 50);
        assert!(!registration.repeatable);

        assert!(catalog.get("NoSuchCondition").is_none());
    }

    #[test]
    fn test_inactive_conditions_stay_listed() {
        let catalog = catalog();

        // An inactive condition is still in the catalog; the service decides
        // that granting it is a no-op.
        let reply = catalog.get(condition_keys::FORUM_REPLY).unwrap();
        assert!(!reply.active);
    }
}
