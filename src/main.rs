use academy_ledger::{bootstrap, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,academy_ledger=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("🚀 Starting payout worker");

    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    let context = bootstrap::initialize_core(&config).await?;

    let scheduler = bootstrap::payout_scheduler(&config, &context);
    let handle = scheduler.start();

    info!("🌐 Payout scheduler running");

    handle.await?;

    Ok(())
}
