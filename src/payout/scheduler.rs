// Payout scheduler - turns unpaid statements into payouts on a schedule
//
// Daily strategy (default):
// - Executes at 02:00 UTC (off-peak hours)
// - One reconciliation pass over every instructor with unpaid statements
// - Fewer, larger payouts; easier approval workflow
//
// Alternative: Hourly for marketplaces with high sales volume

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use super::engine::PayoutEngine;

/// Payout schedule configuration
#[derive(Debug, Clone)]
pub struct PayoutScheduleConfig {
    /// Payout frequency: daily or hourly
    pub frequency: PayoutFrequency,
    /// UTC hour to execute the daily pass (0-23)
    pub execution_hour: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutFrequency {
    Daily,
    Hourly,
}

/// Payout scheduler - runs the reconciliation engine on a schedule
pub struct PayoutScheduler {
    config: PayoutScheduleConfig,
    engine: Arc<PayoutEngine>,
}

impl PayoutScheduler {
    pub fn new(config: PayoutScheduleConfig, engine: Arc<PayoutEngine>) -> Self {
        Self { config, engine }
    }

    /// Start the payout scheduler (runs in background)
    pub fn start(&self) -> JoinHandle<()> {
        let config = self.config.clone();
        let engine = self.engine.clone();

        tokio::spawn(async move {
            match config.frequency {
                PayoutFrequency::Daily => Self::run_daily_scheduler(&config, &engine).await,
                PayoutFrequency::Hourly => Self::run_hourly_scheduler(&engine).await,
            }
        })
    }

    /// Daily scheduler - runs once per day at the configured hour
    async fn run_daily_scheduler(config: &PayoutScheduleConfig, engine: &Arc<PayoutEngine>) {
        loop {
            let now = Utc::now();
            let next_execution = Self::calculate_next_daily_execution(now, config.execution_hour);
            let duration_until_execution = next_execution.signed_duration_since(now);

            if duration_until_execution.num_seconds() > 0 {
                info!(
                    "⏰ Next payout pass scheduled for: {} UTC",
                    next_execution.format("%H:%M:%S")
                );

                tokio::time::sleep(Duration::from_secs(
                    duration_until_execution.num_seconds() as u64,
                ))
                .await;
            }

            Self::run_cycle(engine).await;
        }
    }

    /// Hourly scheduler - runs every hour
    async fn run_hourly_scheduler(engine: &Arc<PayoutEngine>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;
            Self::run_cycle(engine).await;
        }
    }

    /// One reconciliation pass. A failure for one instructor does not stop
    /// the cycle; the unpaid statements simply wait for the next pass.
    async fn run_cycle(engine: &Arc<PayoutEngine>) {
        info!("🔄 Starting payout cycle");

        let instructors = match engine.payable_instructors().await {
            Ok(instructors) => instructors,
            Err(e) => {
                error!("Failed to list payable instructors: {:?}", e);
                return;
            }
        };

        let mut created = 0usize;
        for instructor_id in instructors {
            match engine.compute_payout(instructor_id).await {
                Ok(Some(_)) => created += 1,
                Ok(None) => {}
                Err(e) => {
                    error!("Payout for instructor {} failed: {:?}", instructor_id, e);
                }
            }
        }

        info!("✓ Payout cycle completed: {} payouts created", created);
    }

    /// Calculate next daily execution time
    fn calculate_next_daily_execution(now: DateTime<Utc>, execution_hour: u32) -> DateTime<Utc> {
        let mut next = now.date_naive().and_hms_opt(execution_hour, 0, 0).unwrap();
        let next_dt = Utc.from_utc_datetime(&next);

        // If execution time has passed today, schedule for tomorrow
        if next_dt <= now {
            next = (now.date_naive() + chrono::Duration::days(1))
                .and_hms_opt(execution_hour, 0, 0)
                .unwrap();
            Utc.from_utc_datetime(&next)
        } else {
            next_dt
        }
    }
}
