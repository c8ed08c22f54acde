//! Solve session domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::challenge::{ChallengePayload, ChallengeVerdict};
use crate::domain::errors::{DomainError, DomainResult};

/// Session state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the first payload of a round.
    Init,
    /// A follow-up payload is held and ready to dispatch.
    ChallengePending,
    /// The solve strategy is working on the round.
    Challenging,
    /// The answer was submitted; waiting for a verdict or a new round.
    Submitted,
    /// Terminal: a passing verdict was received.
    Success,
    /// Terminal: the session gave up.
    Failure,
}

impl SessionState {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ChallengePending => "challenge_pending",
            Self::Challenging => "challenging",
            Self::Submitted => "submitted",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    /// `Success` and `Failure` have no exits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::{ChallengePending, Challenging, Failure, Init, Submitted, Success};
        match (self, next) {
            (Success | Failure, _) => false,
            (_, Failure) => true,
            (Init | ChallengePending, Challenging) => true,
            (Init | ChallengePending | Challenging, Init) => true,
            (Challenging, Submitted) => true,
            (Submitted, Success | ChallengePending | Init) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One solve session. Owned by the controller for its whole life.
#[derive(Debug, Clone)]
pub struct Session {
    /// Correlates log lines and archived verdicts.
    pub id: Uuid,
    /// Current state machine state.
    pub state: SessionState,
    /// Loop iterations so far.
    pub attempt_count: u32,
    /// Reloads and follow-up rounds charged against the reset budget.
    pub reset_count: u32,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Payload of the round being worked on.
    pub payload: Option<ChallengePayload>,
    /// Most recent reason a round or wait failed.
    pub last_error: Option<String>,
}

impl Session {
    /// Fresh session in `Init`.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Init,
            attempt_count: 0,
            reset_count: 0,
            started_at: Utc::now(),
            payload: None,
            last_error: None,
        }
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn transition_to(&mut self, next: SessionState) -> DomainResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
                reason: format!("session {}", self.id),
            });
        }
        self.state = next;
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// What the external solve strategy reported for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchSignal {
    /// The round was answered and submitted.
    Submitted,
    /// The strategy could not answer this round.
    Failed,
}

/// Terminal failure causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// `locate_surface` found no challenge widget.
    SurfaceNotFound,
    /// More loop iterations than `max_challenge_attempts`.
    AttemptsExhausted,
    /// More resets than `max_resets`.
    ResetsExhausted,
    /// Neither a verdict nor a payload arrived after a submission.
    ResponseTimeout,
    /// A failing verdict with `retry_on_failure` off.
    VerdictRejected,
    /// The signal wait broke or the state machine was driven illegally.
    WaitFailed,
    /// `execution_timeout` elapsed.
    ExecutionTimeout,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SurfaceNotFound => "challenge surface not found",
            Self::AttemptsExhausted => "attempt limit reached",
            Self::ResetsExhausted => "reset limit reached",
            Self::ResponseTimeout => "no verdict or payload before response timeout",
            Self::VerdictRejected => "verdict rejected",
            Self::WaitFailed => "verdict wait failed",
            Self::ExecutionTimeout => "session execution timeout",
        };
        f.write_str(s)
    }
}

/// Diagnostic context attached to every outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Session the report belongs to.
    pub session_id: Uuid,
    /// Time from `run` until the outcome was decided.
    pub duration: Duration,
    /// Loop iterations used.
    pub attempt_count: u32,
    /// Resets charged.
    pub reset_count: u32,
    /// Last round or wait failure, if any.
    pub last_error: Option<String>,
    /// State the session ended in; always terminal.
    pub final_state: SessionState,
}

/// Terminal result of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// The challenge was passed.
    Success {
        /// The passing verdict.
        verdict: ChallengeVerdict,
        /// Pass token from the surface, or from the verdict when the surface has none.
        token: Option<String>,
        /// Diagnostics.
        report: SessionReport,
    },
    /// The session gave up.
    Failure {
        /// Terminal cause.
        reason: FailureReason,
        /// Diagnostics.
        report: SessionReport,
    },
}

impl SessionOutcome {
    /// Whether the session ended with a passing verdict.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Diagnostics for either outcome.
    pub fn report(&self) -> &SessionReport {
        match self {
            Self::Success { report, .. } | Self::Failure { report, .. } => report,
        }
    }

    /// The terminal cause, for failures.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Failure { reason, .. } => Some(*reason),
            Self::Success { .. } => None,
        }
    }
}
