//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level arguments.
#[derive(Parser)]
#[command(name = "challenge-pilot")]
#[command(about = "Challenge pilot - session orchestration and quota rotation", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .pilot/
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Top-level subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Quota ledger commands
    #[command(subcommand)]
    Ledger(LedgerCommands),

    /// Pick the (model, credentials) pair the next call would use
    Select {
        /// Try this model first
        #[arg(short, long)]
        preferred: Option<String>,
    },
}

/// `ledger` subcommands.
#[derive(Subcommand)]
pub enum LedgerCommands {
    /// List every quota record
    Status,

    /// Clear all quota records
    Reset,

    /// Show per-credential availability for a model
    Check {
        /// Model name
        #[arg(short, long)]
        model: String,
    },
}
