use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

use challenge_pilot::adapters::inference::ScriptedBackend;
use challenge_pilot::adapters::sqlite::{initialize_database, PoolConfig, SqliteQuotaLedger};
use challenge_pilot::domain::errors::InferenceError;
use challenge_pilot::domain::models::{
    Credential, ImagePart, ProviderErrorKind, ProviderOutcome, RotationConfig,
};
use challenge_pilot::domain::ports::{Inference, QuotaLedger};
use challenge_pilot::services::{InferenceGateway, RotationScheduler, SessionMetrics};

async fn file_ledger(dir: &TempDir) -> Arc<SqliteQuotaLedger> {
    let url = format!("sqlite:{}", dir.path().join("quota.db").display());
    let pool = initialize_database(&url, Some(PoolConfig::default())).await.unwrap();
    Arc::new(SqliteQuotaLedger::new(pool))
}

fn rotation(keys: &[&str], models: &[&str]) -> RotationConfig {
    RotationConfig {
        models: models.iter().map(ToString::to_string).collect(),
        credentials: keys.iter().map(|k| Credential::new(*k)).collect(),
        ..RotationConfig::default()
    }
}

fn quota() -> ProviderOutcome<serde_json::Value> {
    ProviderOutcome::Transient(ProviderErrorKind::QuotaExhausted {
        retry_after: None,
        daily: false,
    })
}

#[tokio::test]
async fn test_preferred_model_falls_back_to_next_with_free_credential() {
    let dir = TempDir::new().unwrap();
    let ledger = file_ledger(&dir).await;
    let scheduler = RotationScheduler::from_config(ledger.clone(), &rotation(&["k1", "k2"], &["A", "B", "C"]));

    assert_eq!(scheduler.priority(Some("B")), vec!["B", "A", "C"]);

    for key in ["k1", "k2"] {
        ledger
            .mark_daily_exhausted(&ledger.key_for(&Credential::new(key), "B"))
            .await
            .unwrap();
    }
    ledger
        .mark_exhausted(&ledger.key_for(&Credential::new("k1"), "A"))
        .await
        .unwrap();

    let candidate = scheduler.select_candidate(Some("B")).await.unwrap();
    assert_eq!(candidate.model, "A");
    assert_eq!(candidate.credentials, vec![Credential::new("k2")]);
    assert!(!candidate.fail_open);
}

#[tokio::test]
async fn test_second_process_skips_key_exhausted_by_first() {
    let dir = TempDir::new().unwrap();
    let config = rotation(&["k1", "k2"], &["m1"]);

    let backend_a = Arc::new(ScriptedBackend::new());
    backend_a.push(quota()).await;
    backend_a.push(ProviderOutcome::Ok(json!({ "selected": [0] }))).await;
    let gateway_a = InferenceGateway::new(
        backend_a.clone(),
        file_ledger(&dir).await,
        &config,
        Arc::new(SessionMetrics::new()),
    );
    gateway_a.classify(vec![ImagePart::png("AA")], "bus", None).await.unwrap();

    let backend_b = Arc::new(ScriptedBackend::new());
    backend_b.push(ProviderOutcome::Ok(json!({ "selected": [1] }))).await;
    let metrics_b = Arc::new(SessionMetrics::new());
    let gateway_b = InferenceGateway::new(backend_b.clone(), file_ledger(&dir).await, &config, metrics_b.clone());
    let result = gateway_b.classify(vec![ImagePart::png("AA")], "bus", None).await.unwrap();

    assert_eq!(result.selected, vec![1]);
    let calls = backend_b.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].fingerprint, Credential::new("k2").fingerprint(12));
    assert_eq!(metrics_b.snapshot().inference_calls, 1);
}

#[tokio::test]
async fn test_fail_open_still_attempts_a_call() {
    let dir = TempDir::new().unwrap();
    let ledger = file_ledger(&dir).await;
    let config = rotation(&["k1"], &["m1"]);
    ledger
        .mark_daily_exhausted(&ledger.key_for(&Credential::new("k1"), "m1"))
        .await
        .unwrap();

    let backend = Arc::new(ScriptedBackend::new());
    backend.push(ProviderOutcome::Ok(json!({ "points": [{ "x": 1.0, "y": 2.0 }] }))).await;
    let gateway = InferenceGateway::new(backend.clone(), ledger, &config, Arc::new(SessionMetrics::new()));

    let result = gateway
        .locate_points(vec![], ImagePart::png("GRID"), "click the bird", None)
        .await
        .unwrap();
    assert_eq!(result.points.len(), 1);
    assert_eq!(backend.call_count().await, 1);
}

#[tokio::test]
async fn test_budget_exhaustion_surfaces_last_error() {
    let dir = TempDir::new().unwrap();
    let config = RotationConfig {
        cycles: 1,
        ..rotation(&["k1", "k2"], &["m1", "m2"])
    };
    let backend = Arc::new(ScriptedBackend::always_exhausted());
    let gateway = InferenceGateway::new(
        backend.clone(),
        file_ledger(&dir).await,
        &config,
        Arc::new(SessionMetrics::new()),
    );

    let err = gateway
        .locate_paths(vec![], ImagePart::png("GRID"), "drag the piece", None)
        .await
        .unwrap_err();

    match err {
        InferenceError::RetryBudgetExhausted { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected RetryBudgetExhausted, got {other:?}"),
    }
    assert_eq!(backend.call_count().await, 4, "each pair is tried once per cycle");
}
