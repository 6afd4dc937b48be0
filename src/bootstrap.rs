use std::{sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::{
    analytics::AnalyticsRollup,
    audit::AuditLog,
    config::Config,
    error::AppResult,
    ledger::StatementLedger,
    payout::{PayoutConfig, PayoutEngine, PayoutScheduleConfig, PayoutScheduler},
    rewards::{ConditionCatalog, RewardService},
};

/// Wired core components, handed to the collaborator flows that invoke the
/// ledger in-process.
pub struct CoreContext {
    pub pool: PgPool,
    pub ledger: Arc<StatementLedger>,
    pub payouts: Arc<PayoutEngine>,
    pub rewards: Arc<RewardService>,
    pub analytics: Arc<AnalyticsRollup>,
    pub catalog: Arc<ConditionCatalog>,
    pub audit: Arc<AuditLog>,
}

pub async fn initialize_core(config: &Config) -> AppResult<CoreContext> {
    info!("Initializing ledger core components ...");

    let pool = initialize_database(&config.database_url).await?;

    let audit = Arc::new(AuditLog::new(pool.clone()));
    let ledger = Arc::new(StatementLedger::new(pool.clone()));

    let payout_config = PayoutConfig {
        max_conflict_retries: config.payout_conflict_retries,
    };
    let payouts = Arc::new(PayoutEngine::new(
        payout_config,
        pool.clone(),
        audit.clone(),
    ));

    // Condition catalog is loaded once here and passed to the reward service
    let catalog = Arc::new(ConditionCatalog::load(&pool).await?);
    let rewards = Arc::new(RewardService::new(
        pool.clone(),
        catalog.clone(),
        audit.clone(),
    ));

    let analytics = Arc::new(AnalyticsRollup::new(pool.clone()));

    info!("✅ Ledger core initialized");

    Ok(CoreContext {
        pool,
        ledger,
        payouts,
        rewards,
        analytics,
        catalog,
        audit,
    })
}

/// Build the scheduled payout job from configuration.
pub fn payout_scheduler(config: &Config, context: &CoreContext) -> PayoutScheduler {
    PayoutScheduler::new(
        PayoutScheduleConfig {
            frequency: config.payout_frequency,
            execution_hour: config.payout_execution_hour,
        },
        context.payouts.clone(),
    )
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
