//! Round-robin pointer over a provider's credentials and models.

use crate::domain::models::{CallIdentity, Credential};

/// Credential/model ring held by a provider adapter.
///
/// Advancing moves to the next credential; wrapping back to the first credential also
/// moves to the next model. With a single credential the model advances directly.
#[derive(Debug, Clone)]
pub struct ProviderRing {
    credentials: Vec<Credential>,
    models: Vec<String>,
    key_index: usize,
    model_index: usize,
}

impl ProviderRing {
    /// Ring starting at the first credential and model.
    pub fn new(credentials: Vec<Credential>, models: Vec<String>) -> Self {
        Self {
            credentials,
            models,
            key_index: 0,
            model_index: 0,
        }
    }

    /// True when there is nothing to call.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty() || self.models.is_empty()
    }

    /// Identity the next call should use.
    pub fn current(&self) -> Option<CallIdentity> {
        Some(CallIdentity {
            credential: self.credentials.get(self.key_index)?.clone(),
            model: self.models.get(self.model_index)?.clone(),
        })
    }

    /// Move past the current identity.
    pub fn advance(&mut self) {
        if self.credentials.len() > 1 {
            self.key_index = (self.key_index + 1) % self.credentials.len();
            if self.key_index == 0 {
                self.advance_model();
            }
        } else {
            self.advance_model();
        }
    }

    fn advance_model(&mut self) {
        if self.models.len() > 1 {
            self.model_index = (self.model_index + 1) % self.models.len();
            tracing::debug!(model = %self.models[self.model_index], "rotated model");
        }
    }

    /// Point the ring at a scheduler candidate.
    ///
    /// The model is selected (and added if unknown). The credential moves to the first
    /// usable one only when the current credential is not usable.
    pub fn align(&mut self, model: &str, usable: &[Credential]) {
        self.model_index = match self.models.iter().position(|m| m == model) {
            Some(index) => index,
            None => {
                self.models.push(model.to_string());
                self.models.len() - 1
            }
        };

        let current_usable = self
            .credentials
            .get(self.key_index)
            .is_some_and(|c| usable.contains(c));
        if !current_usable {
            if let Some(index) = usable
                .first()
                .and_then(|first| self.credentials.iter().position(|c| c == first))
            {
                self.key_index = index;
            }
        }
    }

    /// Attempts allowed within one call: `credentials x models x cycles`.
    pub fn budget(&self, cycles: u32) -> u32 {
        let pairs = self.credentials.len().saturating_mul(self.models.len());
        u32::try_from(pairs)
            .unwrap_or(u32::MAX)
            .saturating_mul(cycles.max(1))
    }
}
