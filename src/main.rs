//! RINGSIDE — two-outcome wagering ledger service.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the database, restores the ledger, serves the read-only
//! dashboard and runs until Ctrl+C, flushing pending writes on the way out.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

use ringside::config;
use ringside::dashboard::{self, DashboardState};
use ringside::engine::Ledger;
use ringside::storage::queue::PersistenceQueue;
use ringside::storage::sqlite::SqliteGateway;
use ringside::storage::PersistenceGateway;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;
    init_logging();

    info!(
        starting_credit = cfg.ledger.starting_credit,
        database = %cfg.storage.database_url,
        "RINGSIDE starting up"
    );

    // -- Storage and ledger ----------------------------------------------

    let gateway: Arc<dyn PersistenceGateway> =
        Arc::new(SqliteGateway::connect(&cfg.storage.database_url).await?);
    let (queue, mut worker) = PersistenceQueue::spawn(gateway.clone());
    let ledger = Ledger::restore(&cfg, gateway.clone(), queue).await?;
    let ledger = Arc::new(RwLock::new(ledger));

    // -- Dashboard ---------------------------------------------------------

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(ledger.clone(), gateway.clone()));
        dashboard::spawn_dashboard(state, cfg.dashboard.port).await?;
    }

    info!("Ledger ready. Press Ctrl+C to stop.");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received.");
        }
        _ = &mut worker => {
            error!("Persistence worker exited unexpectedly");
        }
    }

    // -- Graceful shutdown -------------------------------------------------

    let ledger = ledger.read().await;
    if let Err(e) = ledger.flush().await {
        error!(error = %e, "Pending writes could not be flushed");
    }
    info!(
        accounts = ledger.accounts().len(),
        last_round_id = ledger.last_round_id(),
        "RINGSIDE shut down"
    );

    Ok(())
}

/// Initialise the tracing subscriber.
///
/// Uses `RUST_LOG` env var for filtering (defaults to `ringside=info`).
/// Set `RINGSIDE_LOG_JSON=1` for JSON-formatted logs.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ringside=info"));

    if std::env::var("RINGSIDE_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
