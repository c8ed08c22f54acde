//! Quota-aware selection of the next (model, credentials) pair.

use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Credential, RotationConfig};
use crate::domain::ports::QuotaLedger;

/// Result of a scheduling decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Model to call.
    pub model: String,
    /// Usable credentials for `model`, in configured order.
    pub credentials: Vec<Credential>,
    /// Every pair was exhausted; this is a last-resort pick.
    pub fail_open: bool,
}

/// Stateless scheduler over a model priority list and a credential set.
#[derive(Clone)]
pub struct RotationScheduler {
    ledger: Arc<dyn QuotaLedger>,
    models: Vec<String>,
    credentials: Vec<Credential>,
    preferred_model: Option<String>,
}

impl RotationScheduler {
    /// Scheduler with no preferred model.
    pub fn new(ledger: Arc<dyn QuotaLedger>, models: Vec<String>, credentials: Vec<Credential>) -> Self {
        Self {
            ledger,
            models,
            credentials,
            preferred_model: None,
        }
    }

    /// Scheduler over the configured models, credentials and preference.
    pub fn from_config(ledger: Arc<dyn QuotaLedger>, config: &RotationConfig) -> Self {
        Self {
            preferred_model: config.preferred_model.clone(),
            ..Self::new(ledger, config.models.clone(), config.credentials.clone())
        }
    }

    /// Configured credentials, in order.
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// Model priority with `preferred` (or the configured preference) moved to the front.
    pub fn priority(&self, preferred: Option<&str>) -> Vec<String> {
        let preferred = preferred.or(self.preferred_model.as_deref());
        let mut order = Vec::with_capacity(self.models.len() + 1);
        if let Some(preferred) = preferred {
            order.push(preferred.to_string());
        }
        order.extend(
            self.models
                .iter()
                .filter(|m| Some(m.as_str()) != preferred)
                .cloned(),
        );
        order
    }

    /// Credentials that are not exhausted for `model`.
    pub async fn available_credentials(&self, model: &str) -> DomainResult<Vec<Credential>> {
        let mut available = Vec::new();
        for credential in &self.credentials {
            let key = self.ledger.key_for(credential, model);
            if !self.ledger.is_exhausted(&key).await? {
                available.push(credential.clone());
            }
        }
        Ok(available)
    }

    /// Pick the highest-priority model that still has a usable credential.
    ///
    /// Falls open to the top model and first credential when everything is exhausted.
    pub async fn select_candidate(&self, preferred: Option<&str>) -> DomainResult<Candidate> {
        let Some(first_credential) = self.credentials.first() else {
            return Err(DomainError::NoCredentials);
        };
        let order = self.priority(preferred);
        let Some(top_model) = order.first().cloned() else {
            return Err(DomainError::NoModels);
        };

        for model in order {
            let credentials = self.available_credentials(&model).await?;
            if !credentials.is_empty() {
                tracing::debug!(model = %model, usable = credentials.len(), "selected candidate");
                return Ok(Candidate {
                    model,
                    credentials,
                    fail_open: false,
                });
            }
        }

        tracing::warn!(
            model = %top_model,
            credential = %first_credential,
            "all credential/model pairs exhausted, failing open"
        );
        Ok(Candidate {
            model: top_model,
            credentials: vec![first_credential.clone()],
            fail_open: true,
        })
    }
}
