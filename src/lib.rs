pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::quote::QuoteProviderRegistry;
use crate::core::updater::QuoteUpdater;
use crate::store::disk::DiskStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Snapshot {
        portfolio: Option<String>,
        at: Option<DateTime<Utc>>,
    },
    UpdateQuotes {
        security_ids: Vec<String>,
    },
}

/// Opens the store under the configured data path and imports the
/// configuration into it.
pub fn open_store(config: &AppConfig) -> Result<DiskStore> {
    let path = config.default_data_path()?.join("store");
    let store = DiskStore::open(&path)?;
    store.import_config(config)?;
    Ok(store)
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("lotwise starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let store = Arc::new(open_store(&config)?);

    match command {
        AppCommand::Snapshot { portfolio, at } => {
            cli::snapshot::print_snapshots(&config, store.as_ref(), portfolio.as_deref(), at)
                .await
        }
        AppCommand::UpdateQuotes { security_ids } => {
            let registry = Arc::new(QuoteProviderRegistry::from_config(&config.providers));
            let updater = QuoteUpdater::new(store, registry, &config.quotes);
            cli::quotes::update_quotes(&updater, &security_ids).await
        }
    }
}
