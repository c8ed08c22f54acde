//! `select`: show the candidate the scheduler would pick.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::open_ledger;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::services::RotationScheduler;

/// Output of `select`.
#[derive(Debug, Serialize)]
pub struct SelectOutput {
    /// Chosen model.
    pub model: String,
    /// Fingerprints of the usable credentials.
    pub credentials: Vec<String>,
    /// Set when every pair was exhausted.
    pub fail_open: bool,
}

impl CommandOutput for SelectOutput {
    fn to_human(&self) -> String {
        let mut out = format!("Model:       {}\n", self.model);
        out.push_str(&format!("Credentials: {}", self.credentials.join(", ")));
        if self.fail_open {
            out.push_str("\nWarning: every pair is exhausted, this is a fail-open pick");
        }
        out
    }
}

/// Run the scheduler once and print the candidate.
pub async fn execute(preferred: Option<String>, config: &Config, json: bool) -> Result<()> {
    let ledger = open_ledger(config).await?;
    let scheduler = RotationScheduler::from_config(ledger, &config.rotation);

    let candidate = scheduler
        .select_candidate(preferred.as_deref())
        .await
        .context("Failed to select a candidate")?;

    let fingerprint_len = config.ledger.fingerprint_len;
    output(
        &SelectOutput {
            model: candidate.model,
            credentials: candidate
                .credentials
                .iter()
                .map(|c| c.fingerprint(fingerprint_len))
                .collect(),
            fail_open: candidate.fail_open,
        },
        json,
    );
    Ok(())
}
