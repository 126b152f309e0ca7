//! SmartLibrary inventory audit
//!
//! Checks that every title's inventory count and the snapshots embedded in
//! its copies agree with the copies actually stored. Pass `--repair` to
//! reconcile the titles found inconsistent.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smartlibrary_inventory::{config::AppConfig, store, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("smartlibrary_inventory={}", config.logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting SmartLibrary audit v{}", env!("CARGO_PKG_VERSION"));

    let repair = std::env::args().any(|arg| arg == "--repair");

    let store = store::open(&config.store).await?;
    tracing::info!("Opened {:?} store, namespace {}", config.store.backend, config.store.namespace);

    let services = Services::from_store(store, &config);
    let reports = services.inventory.audit(repair).await?;

    let inconsistent = reports.iter().filter(|r| !r.is_consistent()).count();
    tracing::info!(
        "Audited {} titles, {} inconsistent, {} active loans, {} overdue",
        reports.len(),
        inconsistent,
        services.loans.count_active().await?,
        services.loans.count_overdue().await?
    );

    if inconsistent > 0 {
        anyhow::bail!("{} titles are inconsistent", inconsistent);
    }
    Ok(())
}
