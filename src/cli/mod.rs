//! Command-line interface.

pub mod commands;
pub mod output;
pub mod types;

pub use types::{Cli, Commands, LedgerCommands};

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::sqlite::{initialize_database, PoolConfig, SqliteQuotaLedger};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

/// Load configuration from `path`, or from the `.pilot/` hierarchy.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Open and migrate the ledger database named by `config`.
pub async fn open_ledger(config: &Config) -> Result<Arc<SqliteQuotaLedger>> {
    let url = config.ledger.database_url();
    let pool = initialize_database(&url, Some(PoolConfig::from(&config.ledger)))
        .await
        .with_context(|| format!("Failed to open quota ledger at {}", config.ledger.path))?;
    Ok(Arc::new(SqliteQuotaLedger::from_config(pool, &config.ledger)))
}

/// Print an error and exit with a non-zero status.
pub fn handle_error(err: anyhow::Error, json: bool) -> ! {
    if json {
        let body = serde_json::json!({ "error": format!("{err:#}") });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
