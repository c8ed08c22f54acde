//! Attempt/round state machine for one solve session.
//!
//! The controller owns the [`Session`] for its whole life. It waits on the signal
//! queues fed by the event interceptor, dispatches rounds to the solve strategy and
//! decides when to reload, retry or give up.

use std::sync::Arc;
use tokio::time::{sleep, timeout, Instant};
use tracing::Instrument;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    route_payload, ChallengePayload, ChallengeVerdict, DispatchSignal, FailureReason,
    PayloadSignal, Session, SessionConfig, SessionOutcome, SessionReport, SessionState,
};
use crate::domain::ports::{ChallengeSurface, DispatchContext, Inference, SolveStrategy, SurfaceHandle};

use super::metrics::SessionMetrics;
use super::signal_queue::SignalSource;
use super::verdict_archive::VerdictArchive;

const UNREADABLE_PAYLOAD: &str = "round received but payload was unreadable";

/// How a session ended, before the report is attached.
enum Terminal {
    Success {
        verdict: ChallengeVerdict,
        token: Option<String>,
    },
    Failure(FailureReason),
}

/// First signal observed after a submission.
enum Response {
    Verdict(ChallengeVerdict),
    Payload(PayloadSignal),
    Closed,
    Timeout,
}

/// Drives one solve session from surface lookup to a terminal outcome.
pub struct SessionController {
    config: SessionConfig,
    surface: Arc<dyn ChallengeSurface>,
    strategy: Arc<dyn SolveStrategy>,
    inference: Arc<dyn Inference>,
    metrics: Arc<SessionMetrics>,
    archive: Option<VerdictArchive>,
}

impl SessionController {
    /// Build a controller; the verdict archive is enabled when the config names a directory.
    pub fn new(
        config: SessionConfig,
        surface: Arc<dyn ChallengeSurface>,
        strategy: Arc<dyn SolveStrategy>,
        inference: Arc<dyn Inference>,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        let archive = config.verdict_archive_dir.clone().map(VerdictArchive::new);
        Self {
            config,
            surface,
            strategy,
            inference,
            metrics,
            archive,
        }
    }

    /// Run one session to a terminal outcome.
    pub async fn run(&self, signals: &mut SignalSource) -> SessionOutcome {
        let mut session = Session::new();
        let span = tracing::info_span!("session", session_id = %session.id);
        let started = Instant::now();
        self.metrics.record_start();

        let result = timeout(
            self.config.execution_timeout(),
            self.drive(&mut session, signals).instrument(span.clone()),
        )
        .await;
        let terminal = result.unwrap_or_else(|_| {
            session.last_error = Some(format!(
                "session exceeded {}s",
                self.config.execution_timeout().as_secs()
            ));
            Terminal::Failure(FailureReason::ExecutionTimeout)
        });

        if matches!(terminal, Terminal::Failure(_)) && !session.state.is_terminal() {
            if let Err(e) = transition(&mut session, SessionState::Failure) {
                tracing::warn!(parent: &span, error = %e, "could not mark session failed");
            }
        }

        let duration = started.elapsed();
        let report = SessionReport {
            session_id: session.id,
            duration,
            attempt_count: session.attempt_count,
            reset_count: session.reset_count,
            last_error: session.last_error.clone(),
            final_state: session.state,
        };

        match terminal {
            Terminal::Success { verdict, token } => {
                self.metrics.record_finish(true, duration);
                tracing::info!(
                    parent: &span,
                    attempts = report.attempt_count,
                    resets = report.reset_count,
                    duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                    "challenge solved"
                );
                SessionOutcome::Success { verdict, token, report }
            }
            Terminal::Failure(reason) => {
                self.metrics.record_finish(false, duration);
                tracing::warn!(
                    parent: &span,
                    reason = %reason,
                    attempts = report.attempt_count,
                    resets = report.reset_count,
                    last_error = report.last_error.as_deref().unwrap_or(""),
                    "session failed"
                );
                SessionOutcome::Failure { reason, report }
            }
        }
    }

    async fn drive(&self, session: &mut Session, signals: &mut SignalSource) -> Terminal {
        match self.step(session, signals).await {
            Ok(terminal) => terminal,
            Err(e) => {
                tracing::error!(error = %e, "session state machine aborted");
                session.last_error = Some(e.to_string());
                Terminal::Failure(FailureReason::WaitFailed)
            }
        }
    }

    async fn step(&self, session: &mut Session, signals: &mut SignalSource) -> DomainResult<Terminal> {
        signals.drain();

        let handle = match self.surface.locate_surface().await {
            Ok(Some(handle)) => handle,
            Ok(None) => return Ok(Terminal::Failure(FailureReason::SurfaceNotFound)),
            Err(e) => {
                session.last_error = Some(e.to_string());
                return Ok(Terminal::Failure(FailureReason::SurfaceNotFound));
            }
        };
        tracing::debug!(surface = %handle.label, "challenge surface located");

        loop {
            session.attempt_count += 1;
            if session.attempt_count > self.config.max_challenge_attempts {
                return Ok(Terminal::Failure(FailureReason::AttemptsExhausted));
            }
            tracing::debug!(attempt = session.attempt_count, state = %session.state, "session iteration");

            match session.state {
                SessionState::Init | SessionState::ChallengePending => {
                    match self.dispatch(session, signals, &handle).await? {
                        Ok(()) => transition(session, SessionState::Submitted)?,
                        Err(reason) => {
                            tracing::warn!(error = %reason, "round failed");
                            session.last_error = Some(reason);
                            if let Some(terminal) = self.register_reset(session) {
                                return Ok(terminal);
                            }
                            self.reset_surface(session, signals).await;
                            transition(session, SessionState::Init)?;
                        }
                    }
                }
                SessionState::Submitted => match self.await_response(signals).await {
                    Response::Timeout => {
                        session.last_error = Some(format!(
                            "no verdict or payload within {}s",
                            self.config.response_timeout().as_secs()
                        ));
                        return Ok(Terminal::Failure(FailureReason::ResponseTimeout));
                    }
                    Response::Closed => {
                        session.last_error = Some("signal channel closed".to_string());
                        return Ok(Terminal::Failure(FailureReason::WaitFailed));
                    }
                    Response::Payload(payload) => {
                        tracing::info!("new round received after submission");
                        if let Some(terminal) = self.register_reset(session) {
                            return Ok(terminal);
                        }
                        if payload.is_some() {
                            session.payload = payload;
                            transition(session, SessionState::ChallengePending)?;
                        } else {
                            // Already charged; reload without a second reset.
                            session.last_error = Some(UNREADABLE_PAYLOAD.to_string());
                            tracing::warn!("follow-up payload was unreadable, reloading");
                            self.reset_surface(session, signals).await;
                            transition(session, SessionState::Init)?;
                        }
                    }
                    Response::Verdict(verdict) if verdict.is_pass() => {
                        return self.finish_success(session, verdict).await;
                    }
                    Response::Verdict(_) => {
                        session.last_error = Some("verdict rejected".to_string());
                        if !self.config.retry_on_failure {
                            return Ok(Terminal::Failure(FailureReason::VerdictRejected));
                        }
                        tracing::info!("verdict rejected, retrying");
                        sleep(self.config.retry_delay()).await;
                        session.payload = None;
                        transition(session, SessionState::Init)?;
                    }
                },
                state @ (SessionState::Challenging | SessionState::Success | SessionState::Failure) => {
                    return Err(DomainError::InvalidStateTransition {
                        from: state.to_string(),
                        to: SessionState::Challenging.to_string(),
                        reason: "the loop never rests in this state".to_string(),
                    });
                }
            }
        }
    }

    /// One solve-strategy round.
    ///
    /// The inner `Err` carries the reason the round failed; the outer one is an
    /// illegal state transition.
    async fn dispatch(
        &self,
        session: &mut Session,
        signals: &mut SignalSource,
        handle: &SurfaceHandle,
    ) -> DomainResult<Result<(), String>> {
        if session.state == SessionState::Init {
            signals.verdicts.clear();
            if session.payload.is_none() {
                match self.wait_for_payload(signals).await {
                    Ok(payload) => session.payload = Some(payload),
                    Err(reason) => return Ok(Err(reason)),
                }
            }
        }
        let Some(payload) = session.payload.clone() else {
            return Ok(Err(UNREADABLE_PAYLOAD.to_string()));
        };

        if self.is_ignored(&payload).await {
            if let Err(e) = self.surface.refresh_challenge().await {
                tracing::warn!(error = %e, "failed to refresh ignored challenge");
            }
            session.payload = None;
            return Ok(Err(format!("ignored prompt: {}", payload.question())));
        }

        let route = route_payload(&payload);
        tracing::info!(
            kind = route.kind.map_or("unrouted", |k| k.as_str()),
            crumbs = route.crumb_count,
            prompt = %payload.question(),
            "dispatching round"
        );

        transition(session, SessionState::Challenging)?;
        let ctx = DispatchContext {
            session_id: session.id,
            payload: &payload,
            route,
            surface: handle,
            inference: self.inference.clone(),
        };

        Ok(match timeout(self.config.dispatch_timeout(), self.strategy.solve(&ctx)).await {
            Ok(Ok(DispatchSignal::Submitted)) => Ok(()),
            Ok(Ok(DispatchSignal::Failed)) => Err("strategy could not answer the round".to_string()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "dispatch timed out after {}s",
                self.config.dispatch_timeout().as_secs()
            )),
        })
    }

    async fn wait_for_payload(&self, signals: &mut SignalSource) -> Result<ChallengePayload, String> {
        match timeout(self.config.payload_wait(), signals.payloads.recv()).await {
            Ok(Some(Some(payload))) => Ok(payload),
            Ok(Some(None)) => Err(UNREADABLE_PAYLOAD.to_string()),
            Ok(None) => Err("signal channel closed".to_string()),
            Err(_) => Err(format!(
                "no payload within {}s",
                self.config.payload_wait().as_secs()
            )),
        }
    }

    /// Ignore-list check. A check that times out lets solving continue.
    async fn is_ignored(&self, payload: &ChallengePayload) -> bool {
        if self.config.ignore_request_questions.is_empty() {
            return false;
        }
        let check = async {
            let prompt = match self.surface.read_prompt().await {
                Ok(Some(prompt)) => prompt,
                _ => payload.question(),
            };
            let prompt = prompt.to_lowercase();
            self.config
                .ignore_request_questions
                .iter()
                .any(|q| !q.is_empty() && prompt.contains(&q.to_lowercase()))
        };
        match timeout(self.config.ignore_check_timeout(), check).await {
            Ok(ignored) => ignored,
            Err(_) => {
                tracing::debug!("ignore-list check timed out");
                false
            }
        }
    }

    /// Race the verdict slot against the payload queue. The loser is not consumed.
    async fn await_response(&self, signals: &mut SignalSource) -> Response {
        let SignalSource { payloads, verdicts } = signals;
        tokio::select! {
            biased;
            verdict = verdicts.recv() => Response::Verdict(verdict),
            payload = payloads.recv() => match payload {
                Some(payload) => Response::Payload(payload),
                None => Response::Closed,
            },
            () = sleep(self.config.response_timeout()) => Response::Timeout,
        }
    }

    /// Count a reset. Returns a terminal outcome when the budget is exceeded.
    fn register_reset(&self, session: &mut Session) -> Option<Terminal> {
        session.reset_count += 1;
        self.metrics.record_reset();
        (session.reset_count > self.config.max_resets)
            .then_some(Terminal::Failure(FailureReason::ResetsExhausted))
    }

    async fn reset_surface(&self, session: &mut Session, signals: &mut SignalSource) {
        signals.payloads.drain();
        session.payload = None;
        if let Err(e) = self.surface.reload().await {
            tracing::warn!(error = %e, "surface reload failed");
        }
        sleep(self.config.reload_settle()).await;
        if let Err(e) = self.surface.click_checkbox().await {
            tracing::debug!(error = %e, "checkbox click after reload failed");
        }
    }

    async fn finish_success(&self, session: &mut Session, verdict: ChallengeVerdict) -> DomainResult<Terminal> {
        transition(session, SessionState::Success)?;
        if let Some(archive) = &self.archive {
            match archive.store(session.id, &verdict).await {
                Ok(path) => tracing::debug!(path = %path.display(), "verdict archived"),
                Err(e) => tracing::warn!(error = %e, "failed to archive verdict"),
            }
        }
        let token = match self.surface.extract_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read pass token from surface");
                None
            }
        }
        .or_else(|| verdict.token.clone());
        Ok(Terminal::Success { verdict, token })
    }
}

fn transition(session: &mut Session, next: SessionState) -> DomainResult<()> {
    let from = session.state;
    session.transition_to(next)?;
    tracing::debug!(from = %from, to = %next, "state transition");
    Ok(())
}
