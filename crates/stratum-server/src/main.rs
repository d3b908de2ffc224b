//! Stratum Server: process entry point.
//!
//! Connects to SurrealDB, applies migrations and wires the PKI components
//! over a shared store. The engine has no network surface of its own;
//! embedding services drive it through the `stratum-pki` API.

mod config;

use stratum_db::DbManager;
use stratum_pki::{ChainBuilder, IssuanceOrchestrator};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stratum=info")),
        )
        .json()
        .init();

    tracing::info!("Starting Stratum...");

    let config = ServerConfig::from_env()?;
    let manager = DbManager::connect(&config.db).await?;
    manager.migrate().await?;

    let store = manager.store(config.pki.max_hierarchy_depth);
    let _orchestrator = IssuanceOrchestrator::new(store.clone(), config.encryptor, &config.pki);
    let _chains = ChainBuilder::new(store.clone(), &config.pki);

    tracing::info!(
        max_hierarchy_depth = config.pki.max_hierarchy_depth,
        "Stratum ready"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Stratum stopped.");
    Ok(())
}
