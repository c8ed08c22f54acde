//! `ledger` subcommands: inspect and reset the quota ledger.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::cli::output::{format_availability_table, format_quota_table, format_timestamp, output, CommandOutput};
use crate::cli::types::LedgerCommands;
use crate::cli::open_ledger;
use crate::domain::models::{Config, QuotaRecord};
use crate::domain::ports::QuotaLedger;
use crate::services::RotationScheduler;

/// Output of `ledger status`.
#[derive(Debug, Serialize)]
pub struct LedgerStatusOutput {
    /// When the daily reset last ran.
    pub last_reset: Option<DateTime<Utc>>,
    /// Every record in the ledger.
    pub records: Vec<QuotaRecord>,
    #[serde(skip)]
    now: DateTime<Utc>,
}

impl CommandOutput for LedgerStatusOutput {
    fn to_human(&self) -> String {
        let mut out = format!("Last daily reset: {}\n", format_timestamp(self.last_reset));
        if self.records.is_empty() {
            out.push_str("No quota records.");
        } else {
            out.push_str(&format_quota_table(&self.records, self.now));
            out.push_str(&format!("\n{} record(s)", self.records.len()));
        }
        out
    }
}

/// Output of `ledger reset`.
#[derive(Debug, Serialize)]
pub struct LedgerResetOutput {
    /// Records removed.
    pub cleared: u64,
}

impl CommandOutput for LedgerResetOutput {
    fn to_human(&self) -> String {
        format!("Cleared {} quota record(s).", self.cleared)
    }
}

/// One credential's availability for a model.
#[derive(Debug, Serialize)]
pub struct AvailabilityEntry {
    /// Credential fingerprint.
    pub fingerprint: String,
    /// Whether the pair is usable now.
    pub available: bool,
}

/// Output of `ledger check`.
#[derive(Debug, Serialize)]
pub struct LedgerCheckOutput {
    /// Model checked.
    pub model: String,
    /// One entry per configured credential.
    pub credentials: Vec<AvailabilityEntry>,
}

impl CommandOutput for LedgerCheckOutput {
    fn to_human(&self) -> String {
        if self.credentials.is_empty() {
            return "No credentials configured. Set PILOT_CREDENTIALS.".to_string();
        }
        let rows: Vec<(String, bool)> = self
            .credentials
            .iter()
            .map(|c| (c.fingerprint.clone(), c.available))
            .collect();
        let usable = rows.iter().filter(|(_, ok)| *ok).count();
        format!(
            "Model: {}\n{}\n{usable}/{} credential(s) available",
            self.model,
            format_availability_table(&rows),
            rows.len()
        )
    }
}

/// Run a `ledger` subcommand.
pub async fn execute(command: LedgerCommands, config: &Config, json: bool) -> Result<()> {
    match command {
        LedgerCommands::Status => handle_status(config, json).await,
        LedgerCommands::Reset => handle_reset(config, json).await,
        LedgerCommands::Check { model } => handle_check(config, model, json).await,
    }
}

async fn handle_status(config: &Config, json: bool) -> Result<()> {
    let ledger = open_ledger(config).await?;
    let records = ledger.records().await.context("Failed to list quota records")?;
    let last_reset = ledger.last_reset().await.context("Failed to read last reset")?;
    output(
        &LedgerStatusOutput {
            last_reset,
            records,
            now: Utc::now(),
        },
        json,
    );
    Ok(())
}

async fn handle_reset(config: &Config, json: bool) -> Result<()> {
    let ledger = open_ledger(config).await?;
    let cleared = ledger.reset_all().await.context("Failed to reset quota ledger")?;
    tracing::info!(cleared, "quota ledger reset");
    output(&LedgerResetOutput { cleared }, json);
    Ok(())
}

async fn handle_check(config: &Config, model: String, json: bool) -> Result<()> {
    let ledger = open_ledger(config).await?;
    let scheduler = RotationScheduler::from_config(ledger.clone(), &config.rotation);

    let checks = scheduler.credentials().iter().map(|credential| {
        let ledger = ledger.clone();
        let key = ledger.key_for(credential, &model);
        async move {
            let exhausted = ledger
                .is_exhausted(&key)
                .await
                .with_context(|| format!("Failed to check {key}"))?;
            Ok::<_, anyhow::Error>(AvailabilityEntry {
                fingerprint: key.fingerprint,
                available: !exhausted,
            })
        }
    });
    let credentials = join_all(checks).await.into_iter().collect::<Result<Vec<_>>>()?;

    output(&LedgerCheckOutput { model, credentials }, json);
    Ok(())
}
