//! Shared fakes for integration tests
//!
//! Provides a recording challenge surface, a scripted solve strategy and a
//! quiet inference stub, plus builders for payloads and verdicts.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use challenge_pilot::domain::errors::{DomainError, DomainResult, InferenceError};
use challenge_pilot::domain::models::{
    ChallengeKind, ChallengePayload, ChallengeVerdict, DispatchSignal, FrameRef, ImagePart,
    PathResult, PointResult, SessionConfig, StructuredResult,
};
use challenge_pilot::domain::ports::{
    ChallengeSurface, DispatchContext, Inference, SolveStrategy, SurfaceHandle,
};
use challenge_pilot::services::{SessionController, SessionMetrics, SignalSink};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Payload for an image-label-binary round with the given prompt.
pub fn payload(question: &str) -> ChallengePayload {
    ChallengePayload::from_value(json!({
        "key": "E0_round",
        "request_type": "image_label_binary",
        "requester_question": { "en": question },
        "tasklist": [
            { "task_key": "t1", "datapoint_uri": "https://img.example/1.png" },
            { "task_key": "t2", "datapoint_uri": "https://img.example/2.png" }
        ],
        "request_config": {}
    }))
    .expect("valid payload json")
}

pub fn verdict(pass: bool) -> ChallengeVerdict {
    let mut value = json!({ "pass": pass });
    if pass {
        value["generated_pass_UUID"] = json!("P1_verdict-token");
    }
    ChallengeVerdict::from_value(value).expect("valid verdict json")
}

/// Publish a payload once the controller has started waiting.
pub fn publish_payload_after(sink: &SignalSink, delay: Duration, payload: Option<ChallengePayload>) {
    let sink = sink.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        sink.publish_payload(payload);
    });
}

/// Recording fake for the page automation collaborator.
#[derive(Default)]
pub struct FakeSurface {
    pub missing: bool,
    pub token: Option<String>,
    pub prompt: Option<String>,
    pub fail_page_injection: bool,
    pub decoded: Mutex<Option<Value>>,
    pub reloads: AtomicUsize,
    pub checkbox_clicks: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub injected: Mutex<Vec<(String, Option<FrameRef>)>>,
    pub init_scripts: Mutex<Vec<String>>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Self::default()
        }
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            ..Self::default()
        }
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn injected(&self) -> Vec<(String, Option<FrameRef>)> {
        self.injected.lock().unwrap().clone()
    }

    pub fn init_scripts(&self) -> Vec<String> {
        self.init_scripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChallengeSurface for FakeSurface {
    async fn locate_surface(&self) -> DomainResult<Option<SurfaceHandle>> {
        if self.missing {
            return Ok(None);
        }
        Ok(Some(SurfaceHandle {
            frame: Some(FrameRef("challenge-frame".to_string())),
            label: "fake widget".to_string(),
        }))
    }

    async fn reload(&self) -> DomainResult<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn click_checkbox(&self) -> DomainResult<()> {
        self.checkbox_clicks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh_challenge(&self) -> DomainResult<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn extract_token(&self) -> DomainResult<Option<String>> {
        Ok(self.token.clone())
    }

    async fn read_prompt(&self) -> DomainResult<Option<String>> {
        Ok(self.prompt.clone())
    }

    async fn inject_script(&self, script: &str, frame: Option<&FrameRef>) -> DomainResult<()> {
        if frame.is_none() && self.fail_page_injection {
            return Err(DomainError::SurfaceFailed("page not ready".to_string()));
        }
        self.injected
            .lock()
            .unwrap()
            .push((script.to_string(), frame.cloned()));
        Ok(())
    }

    async fn add_init_script(&self, script: &str) -> DomainResult<()> {
        self.init_scripts.lock().unwrap().push(script.to_string());
        Ok(())
    }

    async fn decode_blob(&self, _body: &[u8], _frame: Option<&FrameRef>) -> DomainResult<Option<Value>> {
        Ok(self.decoded.lock().unwrap().clone())
    }
}

/// Signal a step emits into the queues right after it submits.
#[derive(Clone)]
pub enum Emit {
    Verdict(bool),
    Payload(Option<ChallengePayload>),
}

fn emit_into(sink: &SignalSink, emit: Emit) {
    match emit {
        Emit::Verdict(pass) => sink.publish_verdict(verdict(pass)),
        Emit::Payload(p) => {
            sink.publish_payload(p);
        }
    }
}

/// What one `solve` call does.
#[derive(Clone)]
pub enum Step {
    /// Submit, then emit the signals shortly afterwards.
    Submit(Vec<Emit>),
    /// Emit the signals before reporting the submission.
    SubmitNow(Vec<Emit>),
    Fail,
    Error(String),
    Hang,
}

/// Strategy that replays a fixed list of steps. An empty script fails the round.
pub struct ScriptedStrategy {
    steps: Mutex<VecDeque<Step>>,
    sink: SignalSink,
    delay: Duration,
    pub rounds: Mutex<Vec<(Option<ChallengeKind>, String)>>,
}

impl ScriptedStrategy {
    pub fn new(sink: &SignalSink, steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            sink: sink.clone(),
            delay: Duration::from_millis(50),
            rounds: Mutex::new(Vec::new()),
        }
    }

    pub fn round_count(&self) -> usize {
        self.rounds.lock().unwrap().len()
    }

    pub fn questions(&self) -> Vec<String> {
        self.rounds.lock().unwrap().iter().map(|(_, q)| q.clone()).collect()
    }
}

#[async_trait]
impl SolveStrategy for ScriptedStrategy {
    async fn solve(&self, ctx: &DispatchContext<'_>) -> DomainResult<DispatchSignal> {
        self.rounds
            .lock()
            .unwrap()
            .push((ctx.route.kind, ctx.payload.question()));
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Fail);
        match step {
            Step::Submit(emits) => {
                let sink = self.sink.clone();
                let delay = self.delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    for emit in emits {
                        emit_into(&sink, emit);
                    }
                });
                Ok(DispatchSignal::Submitted)
            }
            Step::SubmitNow(emits) => {
                for emit in emits {
                    emit_into(&self.sink, emit);
                }
                Ok(DispatchSignal::Submitted)
            }
            Step::Fail => Ok(DispatchSignal::Failed),
            Step::Error(message) => Err(DomainError::StrategyFailed(message)),
            Step::Hang => {
                std::future::pending::<()>().await;
                Ok(DispatchSignal::Failed)
            }
        }
    }
}

/// Inference stub returning empty results; strategies in these tests never rely on it.
pub struct QuietInference;

#[async_trait]
impl Inference for QuietInference {
    async fn classify(
        &self,
        _images: Vec<ImagePart>,
        _prompt: &str,
        _preferred_model: Option<&str>,
    ) -> Result<StructuredResult, InferenceError> {
        Ok(StructuredResult::default())
    }

    async fn locate_points(
        &self,
        _images: Vec<ImagePart>,
        _grid: ImagePart,
        _prompt: &str,
        _preferred_model: Option<&str>,
    ) -> Result<PointResult, InferenceError> {
        Ok(PointResult::default())
    }

    async fn locate_paths(
        &self,
        _images: Vec<ImagePart>,
        _grid: ImagePart,
        _prompt: &str,
        _preferred_model: Option<&str>,
    ) -> Result<PathResult, InferenceError> {
        Ok(PathResult::default())
    }
}

pub fn controller(
    config: SessionConfig,
    surface: Arc<FakeSurface>,
    strategy: Arc<ScriptedStrategy>,
) -> (SessionController, Arc<SessionMetrics>) {
    let metrics = Arc::new(SessionMetrics::new());
    let controller = SessionController::new(
        config,
        surface,
        strategy,
        Arc::new(QuietInference),
        metrics.clone(),
    );
    (controller, metrics)
}
