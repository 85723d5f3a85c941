use isktally::datasource::{EsiSource, LedgerSource, SsoTokenSource};
use isktally::engine::{prices::initial_sheet, PriceTable};
use isktally::{config::Config, db::init_db, Repository, Scheduler};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));

    let esi = Arc::new(EsiSource::new(config.esi_api_url.clone()));
    let ledger: Arc<dyn LedgerSource> = esi.clone();
    let tokens = Arc::new(SsoTokenSource::new(
        config.sso_api_url.clone(),
        config.sso_client_id.clone(),
        config.sso_client_secret.clone(),
    ));

    // The price table must be populated before any contract can be
    // valuated.
    let sheet = match initial_sheet(&ledger).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to fetch initial market prices: {}", e);
            std::process::exit(1);
        }
    };
    let prices = Arc::new(PriceTable::new(
        sheet,
        Duration::from_secs(config.price_floor_secs),
    ));
    tokio::spawn(Arc::clone(&prices).refresh_loop(ledger.clone()));

    tracing::info!("Starting polling scheduler");

    let scheduler = Scheduler::new(ledger, esi, tokens, repo, prices, config);
    scheduler.run().await;
}
