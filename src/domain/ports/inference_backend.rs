//! Raw inference backend port.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::models::{CallIdentity, InferenceRequest, ProviderOutcome};

/// A provider that answers one structured-output request for an explicit identity.
///
/// Failures are returned as tagged outcomes, never as errors, so the caller can
/// decide how each one affects rotation.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn call(&self, identity: &CallIdentity, request: &InferenceRequest)
        -> ProviderOutcome<Value>;
}
