//! Challenge pilot - session orchestration for interactive challenge solving
//!
//! Drives one solve session at a time through a bounded state machine, fed by
//! intercepted network events, and spreads inference calls over a pool of
//! `(credential, model)` pairs whose quota state lives in a shared SQLite ledger.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and the port traits
//! - **Adapters** (`adapters`): SQLite ledger and HTTP inference backends
//! - **Service Layer** (`services`): Session controller, interceptor, rotation
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use challenge_pilot::services::{signal_channel, EventInterceptor, SessionController};
//!
//! let (sink, mut source) = signal_channel();
//! let interceptor = EventInterceptor::new(config.interceptor.clone(), surface.clone(), sink);
//! let controller = SessionController::new(config.session.clone(), surface, strategy, gateway, metrics);
//! let outcome = controller.run(&mut source).await;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::sqlite::SqliteQuotaLedger;
pub use domain::models::{
    ChallengePayload, ChallengeVerdict, Config, Credential, CredentialModelKey, FailureReason,
    NetworkEvent, QuotaRecord, SessionOutcome, SessionState,
};
pub use domain::ports::{ChallengeSurface, Inference, InferenceBackend, QuotaLedger, SolveStrategy};
pub use domain::{DomainError, DomainResult, InferenceError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    signal_channel, EventInterceptor, InferenceGateway, RotationScheduler, SessionController,
    SessionMetrics,
};
