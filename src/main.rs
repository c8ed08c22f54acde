//! Challenge pilot CLI entry point.

use clap::Parser;

use challenge_pilot::cli::{self, commands, Cli, Commands};
use challenge_pilot::infrastructure::logging::{LogRetention, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => cli::handle_error(err, cli.json),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => cli::handle_error(err, cli.json),
    };

    if let Some(dir) = &config.logging.log_dir {
        if let Err(err) = LogRetention::new(config.logging.retention_days).prune(dir).await {
            tracing::warn!(error = %err, "log retention cleanup failed");
        }
    }

    let result = match cli.command {
        Commands::Ledger(command) => commands::ledger::execute(command, &config, cli.json).await,
        Commands::Select { preferred } => commands::select::execute(preferred, &config, cli.json).await,
    };

    if let Err(err) = result {
        cli::handle_error(err, cli.json);
    }
}
