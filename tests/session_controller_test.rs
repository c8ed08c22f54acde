mod common;

use std::sync::Arc;
use std::time::Duration;

use challenge_pilot::domain::models::{
    ChallengeKind, FailureReason, SessionConfig, SessionOutcome, SessionState,
};
use challenge_pilot::services::signal_channel;

use common::{controller, payload, publish_payload_after, verdict, Emit, FakeSurface, ScriptedStrategy, Step};

const FIRST: Duration = Duration::from_millis(10);
const AFTER_RELOAD: Duration = Duration::from_secs(3);

fn config() -> SessionConfig {
    SessionConfig::default()
}

fn expect_failure(outcome: &SessionOutcome) -> FailureReason {
    match outcome {
        SessionOutcome::Failure { reason, .. } => *reason,
        SessionOutcome::Success { .. } => panic!("expected failure, session succeeded"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_passing_verdict_returns_surface_token() {
    let (sink, mut source) = signal_channel();
    let surface = Arc::new(FakeSurface::with_token("surface-token"));
    let strategy = Arc::new(ScriptedStrategy::new(&sink, vec![Step::Submit(vec![Emit::Verdict(true)])]));
    let (controller, metrics) = controller(config(), surface.clone(), strategy.clone());

    publish_payload_after(&sink, FIRST, Some(payload("Please click each image containing a bus")));
    let outcome = controller.run(&mut source).await;

    match outcome {
        SessionOutcome::Success { verdict, token, report } => {
            assert!(verdict.pass);
            assert_eq!(token.as_deref(), Some("surface-token"));
            assert_eq!(report.attempt_count, 2);
            assert_eq!(report.reset_count, 0);
            assert_eq!(report.final_state, SessionState::Success);
        }
        SessionOutcome::Failure { reason, .. } => panic!("unexpected failure: {reason}"),
    }
    assert_eq!(strategy.round_count(), 1);
    assert_eq!(
        strategy.rounds.lock().unwrap()[0].0,
        Some(ChallengeKind::ImageLabelBinary)
    );
    assert_eq!(surface.reloads(), 0);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.sessions_started, 1);
    assert_eq!(snapshot.sessions_succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_token_falls_back_to_verdict() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(&sink, vec![Step::Submit(vec![Emit::Verdict(true)])]));
    let (controller, _) = controller(config(), Arc::new(FakeSurface::new()), strategy);

    publish_payload_after(&sink, FIRST, Some(payload("bus")));
    let outcome = controller.run(&mut source).await;

    match outcome {
        SessionOutcome::Success { token, .. } => assert_eq!(token.as_deref(), Some("P1_verdict-token")),
        SessionOutcome::Failure { reason, .. } => panic!("unexpected failure: {reason}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_response_after_submit_fails_within_reset_budget() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(&sink, vec![Step::Submit(vec![])]));
    let config = SessionConfig {
        max_resets: 1,
        ..config()
    };
    let (controller, _) = controller(config, Arc::new(FakeSurface::new()), strategy);

    publish_payload_after(&sink, FIRST, Some(payload("bus")));
    let outcome = controller.run(&mut source).await;

    assert_eq!(expect_failure(&outcome), FailureReason::ResponseTimeout);
    let report = outcome.report();
    assert!(report.reset_count <= 1);
    assert!(report.duration >= Duration::from_secs(45));
    assert!(report.last_error.as_deref().unwrap_or_default().contains("45s"));
}

#[tokio::test(start_paused = true)]
async fn test_payload_after_submit_starts_new_round() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(
        &sink,
        vec![
            Step::Submit(vec![Emit::Payload(Some(payload("second round")))]),
            Step::Submit(vec![Emit::Verdict(true)]),
        ],
    ));
    let surface = Arc::new(FakeSurface::new());
    let (controller, _) = controller(config(), surface.clone(), strategy.clone());

    publish_payload_after(&sink, FIRST, Some(payload("first round")));
    let outcome = controller.run(&mut source).await;

    assert!(outcome.is_success());
    let report = outcome.report();
    assert_eq!(report.reset_count, 1, "a follow-up round costs exactly one reset");
    assert_eq!(report.attempt_count, 4);
    assert_eq!(strategy.questions(), vec!["first round", "second round"]);
    assert_eq!(surface.reloads(), 0, "a follow-up round does not reload the page");
}

#[tokio::test(start_paused = true)]
async fn test_payload_after_submit_over_budget_fails() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(
        &sink,
        vec![Step::Submit(vec![Emit::Payload(Some(payload("second round")))])],
    ));
    let config = SessionConfig {
        max_resets: 0,
        ..config()
    };
    let (controller, _) = controller(config, Arc::new(FakeSurface::new()), strategy.clone());

    publish_payload_after(&sink, FIRST, Some(payload("first round")));
    let outcome = controller.run(&mut source).await;

    assert_eq!(expect_failure(&outcome), FailureReason::ResetsExhausted);
    assert_eq!(strategy.round_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_limit_wins_over_pending_verdict() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(&sink, vec![Step::SubmitNow(vec![Emit::Verdict(true)])]));
    let config = SessionConfig {
        max_challenge_attempts: 1,
        ..config()
    };
    let (controller, _) = controller(config, Arc::new(FakeSurface::new()), strategy.clone());

    publish_payload_after(&sink, FIRST, Some(payload("bus")));
    let outcome = controller.run(&mut source).await;

    assert_eq!(expect_failure(&outcome), FailureReason::AttemptsExhausted);
    assert_eq!(outcome.report().attempt_count, 2);
    assert_eq!(strategy.round_count(), 1);
    assert!(source.verdicts.try_recv().is_some(), "the passing verdict was never consumed");
}

#[tokio::test(start_paused = true)]
async fn test_failed_round_reloads_and_retries() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(
        &sink,
        vec![Step::Fail, Step::Submit(vec![Emit::Verdict(true)])],
    ));
    let surface = Arc::new(FakeSurface::new());
    let (controller, metrics) = controller(config(), surface.clone(), strategy.clone());

    publish_payload_after(&sink, FIRST, Some(payload("first")));
    publish_payload_after(&sink, AFTER_RELOAD, Some(payload("after reload")));
    let outcome = controller.run(&mut source).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.report().reset_count, 1);
    assert_eq!(surface.reloads(), 1);
    assert_eq!(surface.checkbox_clicks.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(strategy.questions(), vec!["first", "after reload"]);
    assert_eq!(metrics.snapshot().resets, 1);
}

#[tokio::test(start_paused = true)]
async fn test_strategy_error_counts_as_failed_round() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(
        &sink,
        vec![Step::Error("grid not found".to_string()), Step::Error("grid not found".to_string())],
    ));
    let surface = Arc::new(FakeSurface::new());
    let (controller, _) = controller(config(), surface.clone(), strategy);

    publish_payload_after(&sink, FIRST, Some(payload("first")));
    publish_payload_after(&sink, AFTER_RELOAD, Some(payload("second")));
    let outcome = controller.run(&mut source).await;

    assert_eq!(expect_failure(&outcome), FailureReason::ResetsExhausted);
    let report = outcome.report();
    assert_eq!(report.reset_count, 2);
    assert!(report.last_error.as_deref().unwrap_or_default().contains("grid not found"));
    assert_eq!(surface.reloads(), 1, "the exhausted reset does not reload");
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_timeout_is_a_failed_round() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(&sink, vec![Step::Hang]));
    let config = SessionConfig {
        max_resets: 0,
        dispatch_timeout_secs: 2,
        ..config()
    };
    let (controller, _) = controller(config, Arc::new(FakeSurface::new()), strategy);

    publish_payload_after(&sink, FIRST, Some(payload("bus")));
    let outcome = controller.run(&mut source).await;

    assert_eq!(expect_failure(&outcome), FailureReason::ResetsExhausted);
    assert!(outcome
        .report()
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_verdict_without_retry_fails() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(&sink, vec![Step::Submit(vec![Emit::Verdict(false)])]));
    let config = SessionConfig {
        retry_on_failure: false,
        ..config()
    };
    let (controller, metrics) = controller(config, Arc::new(FakeSurface::new()), strategy);

    publish_payload_after(&sink, FIRST, Some(payload("bus")));
    let outcome = controller.run(&mut source).await;

    assert_eq!(expect_failure(&outcome), FailureReason::VerdictRejected);
    assert_eq!(outcome.report().final_state, SessionState::Failure);
    assert_eq!(metrics.snapshot().sessions_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_verdict_with_retry_starts_over() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(
        &sink,
        vec![
            Step::Submit(vec![Emit::Verdict(false)]),
            Step::Submit(vec![Emit::Verdict(true)]),
        ],
    ));
    let surface = Arc::new(FakeSurface::new());
    let (controller, _) = controller(config(), surface.clone(), strategy.clone());

    publish_payload_after(&sink, FIRST, Some(payload("first")));
    publish_payload_after(&sink, AFTER_RELOAD, Some(payload("retry")));
    let outcome = controller.run(&mut source).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.report().reset_count, 0);
    assert_eq!(strategy.questions(), vec!["first", "retry"]);
    assert_eq!(surface.reloads(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_surface_is_immediately_terminal() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(&sink, vec![Step::Submit(vec![Emit::Verdict(true)])]));
    let (controller, _) = controller(config(), Arc::new(FakeSurface::missing()), strategy.clone());

    let outcome = controller.run(&mut source).await;

    assert_eq!(expect_failure(&outcome), FailureReason::SurfaceNotFound);
    assert_eq!(outcome.report().attempt_count, 0);
    assert_eq!(outcome.report().final_state, SessionState::Failure);
    assert_eq!(strategy.round_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_execution_timeout_bounds_the_session() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(&sink, vec![Step::Hang]));
    let config = SessionConfig {
        execution_timeout_secs: 5,
        ..config()
    };
    let (controller, _) = controller(config, Arc::new(FakeSurface::new()), strategy);

    publish_payload_after(&sink, FIRST, Some(payload("bus")));
    let outcome = controller.run(&mut source).await;

    assert_eq!(expect_failure(&outcome), FailureReason::ExecutionTimeout);
    let report = outcome.report();
    assert_eq!(report.final_state, SessionState::Failure);
    assert!(report.duration >= Duration::from_secs(5));
    assert!(report.duration < Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_stale_signals_are_discarded_at_start() {
    let (sink, mut source) = signal_channel();
    sink.publish_payload(Some(payload("stale round")));
    sink.publish_verdict(verdict(true));

    let strategy = Arc::new(ScriptedStrategy::new(&sink, vec![Step::Submit(vec![])]));
    let config = SessionConfig {
        response_timeout_secs: 5,
        ..config()
    };
    let (controller, _) = controller(config, Arc::new(FakeSurface::new()), strategy.clone());

    publish_payload_after(&sink, FIRST, Some(payload("fresh round")));
    let outcome = controller.run(&mut source).await;

    assert_eq!(expect_failure(&outcome), FailureReason::ResponseTimeout);
    assert_eq!(strategy.questions(), vec!["fresh round"]);
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_payload_resets_surface() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(&sink, vec![Step::Submit(vec![Emit::Verdict(true)])]));
    let surface = Arc::new(FakeSurface::new());
    let (controller, _) = controller(config(), surface.clone(), strategy.clone());

    publish_payload_after(&sink, FIRST, None);
    publish_payload_after(&sink, AFTER_RELOAD, Some(payload("readable")));
    let outcome = controller.run(&mut source).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.report().reset_count, 1);
    assert_eq!(surface.reloads(), 1);
    assert_eq!(strategy.questions(), vec!["readable"]);
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_follow_up_costs_one_reset_and_reloads() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(
        &sink,
        vec![
            Step::Submit(vec![Emit::Payload(None)]),
            Step::Submit(vec![Emit::Verdict(true)]),
        ],
    ));
    let surface = Arc::new(FakeSurface::new());
    let (controller, _) = controller(config(), surface.clone(), strategy.clone());

    publish_payload_after(&sink, FIRST, Some(payload("first")));
    publish_payload_after(&sink, AFTER_RELOAD, Some(payload("readable")));
    let outcome = controller.run(&mut source).await;

    assert!(outcome.is_success(), "failed: {:?}", outcome.failure_reason());
    let report = outcome.report();
    assert_eq!(report.reset_count, 1);
    assert_eq!(report.attempt_count, 4);
    assert_eq!(surface.reloads(), 1);
    assert_eq!(strategy.questions(), vec!["first", "readable"]);
}

#[tokio::test(start_paused = true)]
async fn test_ignored_prompt_is_refreshed_not_solved() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(&sink, vec![Step::Submit(vec![Emit::Verdict(true)])]));
    let surface = Arc::new(FakeSurface::new());
    let config = SessionConfig {
        ignore_request_questions: vec!["crosswalk".to_string()],
        ..config()
    };
    let (controller, _) = controller(config, surface.clone(), strategy.clone());

    publish_payload_after(&sink, FIRST, Some(payload("Please click each image containing a CROSSWALK")));
    publish_payload_after(&sink, AFTER_RELOAD, Some(payload("Please click each image containing a bus")));
    let outcome = controller.run(&mut source).await;

    assert!(outcome.is_success());
    assert_eq!(surface.refreshes(), 1);
    assert_eq!(strategy.questions(), vec!["Please click each image containing a bus"]);
}

#[tokio::test(start_paused = true)]
async fn test_no_payload_within_wait_fails_round() {
    let (sink, mut source) = signal_channel();
    let strategy = Arc::new(ScriptedStrategy::new(&sink, vec![]));
    let config = SessionConfig {
        max_resets: 0,
        ..config()
    };
    let (controller, _) = controller(config, Arc::new(FakeSurface::new()), strategy.clone());

    let outcome = controller.run(&mut source).await;

    assert_eq!(expect_failure(&outcome), FailureReason::ResetsExhausted);
    assert!(outcome
        .report()
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("no payload"));
    assert_eq!(strategy.round_count(), 0);
}
