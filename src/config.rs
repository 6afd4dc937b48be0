use serde::Deserialize;

use crate::payout::scheduler::PayoutFrequency;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub payout_frequency: PayoutFrequency,
    pub payout_execution_hour: u32,
    pub payout_conflict_retries: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let frequency = match std::env::var("PAYOUT_FREQUENCY")
            .unwrap_or_else(|_| "daily".to_string())
            .to_lowercase()
            .as_str()
        {
            "daily" => PayoutFrequency::Daily,
            "hourly" => PayoutFrequency::Hourly,
            other => {
                return Err(config::ConfigError::Message(format!(
                    "PAYOUT_FREQUENCY must be 'daily' or 'hourly', got '{}'",
                    other
                )))
            }
        };

        let execution_hour = std::env::var("PAYOUT_EXECUTION_HOUR")
            .unwrap_or_else(|_| "2".to_string())
            .parse::<u32>()
            .map_err(|e| config::ConfigError::Message(format!("PAYOUT_EXECUTION_HOUR: {}", e)))?;

        if execution_hour > 23 {
            return Err(config::ConfigError::Message(
                "PAYOUT_EXECUTION_HOUR must be 0-23".to_string(),
            ));
        }

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/academy".to_string()),
            payout_frequency: frequency,
            payout_execution_hour: execution_hour,
            payout_conflict_retries: std::env::var("PAYOUT_CONFLICT_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse::<u32>()
                .map_err(|e| {
                    config::ConfigError::Message(format!("PAYOUT_CONFLICT_RETRIES: {}", e))
                })?,
        })
    }
}
