//! Scripted inference backend for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::models::{CallIdentity, InferenceRequest, ProviderErrorKind, ProviderOutcome};
use crate::domain::ports::InferenceBackend;

/// One observed call: the credential fingerprint and model it was made with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Fingerprint of the credential used.
    pub fingerprint: String,
    /// Model requested.
    pub model: String,
}

/// Backend that replays queued outcomes in order.
///
/// Once the script is empty the fallback outcome is returned for every call.
pub struct ScriptedBackend {
    script: Arc<RwLock<VecDeque<ProviderOutcome<Value>>>>,
    fallback: ProviderOutcome<Value>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
}

impl ScriptedBackend {
    /// Backend whose fallback is an empty JSON object.
    pub fn new() -> Self {
        Self::with_fallback(ProviderOutcome::Ok(Value::Object(serde_json::Map::new())))
    }

    /// Backend returning `fallback` once the script runs out.
    pub fn with_fallback(fallback: ProviderOutcome<Value>) -> Self {
        Self {
            script: Arc::new(RwLock::new(VecDeque::new())),
            fallback,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Backend whose every call reports a quota signal.
    pub fn always_exhausted() -> Self {
        Self::with_fallback(ProviderOutcome::Transient(ProviderErrorKind::QuotaExhausted {
            retry_after: None,
            daily: false,
        }))
    }

    /// Queue the next outcome.
    pub async fn push(&self, outcome: ProviderOutcome<Value>) {
        self.script.write().await.push_back(outcome);
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Number of calls made so far.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn call(&self, identity: &CallIdentity, _request: &InferenceRequest) -> ProviderOutcome<Value> {
        self.calls.write().await.push(RecordedCall {
            fingerprint: identity.credential.fingerprint(12),
            model: identity.model.clone(),
        });
        self.script
            .write()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
