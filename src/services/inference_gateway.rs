//! Dispatch boundary between solve strategies and inference backends.
//!
//! Each call asks the scheduler for a candidate, aligns the provider ring with it and
//! then walks the ring until a call succeeds or the retry budget is spent. Every
//! provider outcome is written back to the quota ledger before the ring moves on.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::domain::errors::{DomainError, InferenceError};
use crate::domain::models::{
    CredentialModelKey, ImagePart, InferenceRequest, InferenceTask, PathResult, PointResult,
    ProviderErrorKind, ProviderOutcome, RotationConfig, StructuredResult,
};
use crate::domain::ports::{Inference, InferenceBackend, QuotaLedger};

use super::metrics::SessionMetrics;
use super::provider_ring::ProviderRing;
use super::rotation_scheduler::RotationScheduler;

const CLASSIFY_INSTRUCTION: &str = "You are labelling challenge images. Reply with JSON \
    {\"selected\": [indices of matching images, 0-based], \"challenge_prompt\": string}.";

const POINTS_INSTRUCTION: &str = "You locate objects on a gridded image. Reply with JSON \
    {\"points\": [{\"x\": number, \"y\": number}]} using grid coordinates.";

const PATHS_INSTRUCTION: &str = "You plan drag moves on a gridded image. Reply with JSON \
    {\"paths\": [{\"start\": {\"x\": number, \"y\": number}, \"end\": {\"x\": number, \"y\": number}}]}.";

/// [`Inference`] implementation rotating over credentials and models.
pub struct InferenceGateway {
    backend: Arc<dyn InferenceBackend>,
    ledger: Arc<dyn QuotaLedger>,
    scheduler: RotationScheduler,
    ring: Mutex<ProviderRing>,
    cycles: u32,
    retry_wait: Duration,
    metrics: Arc<SessionMetrics>,
}

impl InferenceGateway {
    /// Gateway over `backend`, recording outcomes in `ledger`.
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        ledger: Arc<dyn QuotaLedger>,
        config: &RotationConfig,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        let scheduler = RotationScheduler::from_config(ledger.clone(), config);
        let ring = ProviderRing::new(config.credentials.clone(), scheduler.priority(None));
        Self {
            backend,
            ledger,
            scheduler,
            ring: Mutex::new(ring),
            cycles: config.cycles,
            retry_wait: config.retry_wait(),
            metrics,
        }
    }

    fn ring(&self) -> MutexGuard<'_, ProviderRing> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one request through rotation and decode the result as `T`.
    pub async fn call<T: DeserializeOwned>(&self, request: &InferenceRequest) -> Result<T, InferenceError> {
        let candidate = match self
            .scheduler
            .select_candidate(request.preferred_model.as_deref())
            .await
        {
            Ok(candidate) => candidate,
            Err(DomainError::NoCredentials) => return Err(InferenceError::NoCredentials),
            Err(e) => return Err(InferenceError::Ledger(e)),
        };

        let budget = {
            let mut ring = self.ring();
            ring.align(&candidate.model, &candidate.credentials);
            ring.budget(self.cycles)
        };

        let mut last_error = String::from("no attempt made");
        for attempt in 1..=budget {
            let Some(identity) = self.ring().current() else {
                return Err(InferenceError::NoCredentials);
            };
            let key = self.ledger.key_for(&identity.credential, &identity.model);

            if !candidate.fail_open && self.ledger.is_exhausted(&key).await? {
                tracing::debug!(key = %key, attempt, "skipping exhausted credential");
                last_error = format!("{key} exhausted");
                self.ring().advance();
                continue;
            }

            self.metrics.record_inference_call();
            let outcome = match self.backend.call(&identity, request).await {
                ProviderOutcome::Ok(value) => match serde_json::from_value::<T>(value) {
                    Ok(result) => {
                        self.ledger.mark_success(&key).await?;
                        tracing::debug!(key = %key, attempt, task = request.task.as_str(), "inference succeeded");
                        return Ok(result);
                    }
                    Err(e) => ProviderOutcome::Unstable(ProviderErrorKind::MalformedResponse(e.to_string())),
                },
                failed => failed,
            };

            last_error = self.record_failure(&key, attempt, budget, outcome).await?;
            self.ring().advance();

            if attempt < budget && !self.retry_wait.is_zero() {
                tokio::time::sleep(self.retry_wait).await;
            }
        }

        Err(InferenceError::RetryBudgetExhausted {
            attempts: budget,
            last: last_error,
        })
    }

    async fn record_failure(
        &self,
        key: &CredentialModelKey,
        attempt: u32,
        budget: u32,
        outcome: ProviderOutcome<serde_json::Value>,
    ) -> Result<String, InferenceError> {
        match outcome {
            ProviderOutcome::Transient(kind) => {
                self.metrics.record_quota_signal();
                tracing::warn!(key = %key, attempt, budget, error = %kind, "provider quota signal");
                match &kind {
                    ProviderErrorKind::QuotaExhausted { retry_after: Some(hint), .. } => {
                        self.ledger.mark_temporary_exhaustion(key, *hint).await?;
                    }
                    ProviderErrorKind::QuotaExhausted { daily: true, .. } => {
                        self.ledger.mark_daily_exhausted(key).await?;
                    }
                    _ => {
                        self.ledger.mark_exhausted(key).await?;
                    }
                }
                Ok(kind.to_string())
            }
            ProviderOutcome::Unstable(kind) => {
                self.metrics.record_provider_failure();
                tracing::warn!(key = %key, attempt, budget, error = %kind, "provider call failed");
                self.ledger.mark_failure(key).await?;
                Ok(kind.to_string())
            }
            ProviderOutcome::Ok(_) => Ok(String::new()),
        }
    }
}

#[async_trait]
impl Inference for InferenceGateway {
    async fn classify(
        &self,
        images: Vec<ImagePart>,
        prompt: &str,
        preferred_model: Option<&str>,
    ) -> Result<StructuredResult, InferenceError> {
        let request = InferenceRequest {
            task: InferenceTask::Classify,
            images,
            grid: None,
            prompt: prompt.to_string(),
            description: Some(CLASSIFY_INSTRUCTION.to_string()),
            preferred_model: preferred_model.map(str::to_string),
        };
        self.call(&request).await
    }

    async fn locate_points(
        &self,
        images: Vec<ImagePart>,
        grid: ImagePart,
        prompt: &str,
        preferred_model: Option<&str>,
    ) -> Result<PointResult, InferenceError> {
        let request = InferenceRequest {
            task: InferenceTask::LocatePoints,
            images,
            grid: Some(grid),
            prompt: prompt.to_string(),
            description: Some(POINTS_INSTRUCTION.to_string()),
            preferred_model: preferred_model.map(str::to_string),
        };
        self.call(&request).await
    }

    async fn locate_paths(
        &self,
        images: Vec<ImagePart>,
        grid: ImagePart,
        prompt: &str,
        preferred_model: Option<&str>,
    ) -> Result<PathResult, InferenceError> {
        let request = InferenceRequest {
            task: InferenceTask::LocatePaths,
            images,
            grid: Some(grid),
            prompt: prompt.to_string(),
            description: Some(PATHS_INSTRUCTION.to_string()),
            preferred_model: preferred_model.map(str::to_string),
        };
        self.call(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::inference::ScriptedBackend;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteQuotaLedger};
    use crate::domain::models::Credential;
    use serde_json::json;

    async fn gateway(
        keys: &[&str],
        models: &[&str],
        backend: Arc<ScriptedBackend>,
    ) -> (InferenceGateway, Arc<SqliteQuotaLedger>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let ledger = Arc::new(SqliteQuotaLedger::new(pool));
        let config = RotationConfig {
            models: models.iter().map(ToString::to_string).collect(),
            credentials: keys.iter().map(|k| Credential::new(*k)).collect(),
            ..RotationConfig::default()
        };
        let gateway = InferenceGateway::new(backend, ledger.clone(), &config, Arc::new(SessionMetrics::new()));
        (gateway, ledger)
    }

    fn quota() -> ProviderOutcome<serde_json::Value> {
        ProviderOutcome::Transient(ProviderErrorKind::QuotaExhausted {
            retry_after: None,
            daily: false,
        })
    }

    #[tokio::test]
    async fn test_quota_signal_rotates_to_next_key() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(quota()).await;
        backend.push(ProviderOutcome::Ok(json!({"selected": [1]}))).await;
        let (gateway, ledger) = gateway(&["k1", "k2"], &["m1"], backend.clone()).await;

        let result = gateway.classify(vec![ImagePart::png("AA")], "bus", None).await.unwrap();
        assert_eq!(result.selected, vec![1]);

        let calls = backend.calls().await;
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].fingerprint, calls[1].fingerprint);

        let k1 = ledger.key_for(&Credential::new("k1"), "m1");
        let record = ledger.record(&k1).await.unwrap().unwrap();
        assert_eq!(record.backoff_count, 1);
        assert!(ledger.is_exhausted(&k1).await.unwrap());
    }

    #[tokio::test]
    async fn test_retry_hint_sets_exact_cooldown() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .push(ProviderOutcome::Transient(ProviderErrorKind::QuotaExhausted {
                retry_after: Some(Duration::from_secs(9)),
                daily: false,
            }))
            .await;
        let (gateway, ledger) = gateway(&["k1", "k2"], &["m1"], backend).await;

        let _: serde_json::Value = gateway
            .call(&InferenceRequest {
                task: InferenceTask::Classify,
                images: vec![],
                grid: None,
                prompt: "p".into(),
                description: None,
                preferred_model: None,
            })
            .await
            .unwrap();

        let record = ledger
            .record(&ledger.key_for(&Credential::new("k1"), "m1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.backoff_count, 0);
        assert!(record.temporary_exhausted_until.is_some());
    }

    #[tokio::test]
    async fn test_budget_exhaustion_reports_attempts() {
        let backend = Arc::new(ScriptedBackend::with_fallback(ProviderOutcome::Unstable(
            ProviderErrorKind::ServerError {
                status: 500,
                message: "boom".into(),
            },
        )));
        let (gateway, _) = gateway(&["k1", "k2"], &["m1", "m2"], backend.clone()).await;

        let err = gateway.classify(vec![], "bus", None).await.unwrap_err();
        match err {
            InferenceError::RetryBudgetExhausted { attempts, .. } => assert_eq!(attempts, 12),
            other => panic!("unexpected error: {other}"),
        }
        // Each pair is called exactly `cycles` times before crossing the instability threshold.
        assert_eq!(backend.call_count().await, 12);
    }

    #[tokio::test]
    async fn test_undecodable_result_counts_as_failure() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(ProviderOutcome::Ok(json!({"points": "nope"}))).await;
        backend.push(ProviderOutcome::Ok(json!({"points": [{"x": 1.0, "y": 2.0}]}))).await;
        let (gateway, ledger) = gateway(&["k1"], &["m1"], backend).await;

        let result = gateway
            .locate_points(vec![], ImagePart::png("GG"), "click the cat", None)
            .await
            .unwrap();
        assert_eq!(result.points.len(), 1);
        let record = ledger
            .record(&ledger.key_for(&Credential::new("k1"), "m1"))
            .await
            .unwrap()
            .unwrap();
        // Success on the same key cleared the failure.
        assert_eq!(record.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_no_credentials() {
        let backend = Arc::new(ScriptedBackend::new());
        let (gateway, _) = gateway(&[], &["m1"], backend).await;
        assert!(matches!(
            gateway.classify(vec![], "bus", None).await,
            Err(InferenceError::NoCredentials)
        ));
    }

    #[tokio::test]
    async fn test_retry_hint_wins_over_daily_quota() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .push(ProviderOutcome::Transient(ProviderErrorKind::QuotaExhausted {
                retry_after: Some(Duration::from_secs(32)),
                daily: true,
            }))
            .await;
        let (gateway, ledger) = gateway(&["k1", "k2"], &["m1"], backend).await;

        gateway.classify(vec![], "bus", None).await.unwrap();

        let record = ledger
            .record(&ledger.key_for(&Credential::new("k1"), "m1"))
            .await
            .unwrap()
            .unwrap();
        assert!(!record.daily_exhausted);
        assert!(record.temporary_exhausted_until.is_some());
    }

    #[tokio::test]
    async fn test_preferred_model_is_tried_first() {
        let backend = Arc::new(ScriptedBackend::new());
        let (gateway, _) = gateway(&["k1"], &["m1", "m2"], backend.clone()).await;

        gateway.classify(vec![], "bus", Some("m2")).await.unwrap();
        gateway.classify(vec![], "bus", None).await.unwrap();

        let models: Vec<String> = backend.calls().await.into_iter().map(|c| c.model).collect();
        assert_eq!(models, vec!["m2".to_string(), "m1".to_string()]);
    }
}
