//! Domain models for sessions, challenges, quotas and inference.

pub mod challenge;
pub mod config;
pub mod event;
pub mod inference;
pub mod quota;
pub mod session;

pub use challenge::{
    route_payload, ChallengeKind, ChallengePayload, ChallengeRoute, ChallengeTask,
    ChallengeVerdict, RequestConfig, RequestType,
};
pub use config::{
    Config, InterceptorConfig, LedgerConfig, LoggingConfig, ProviderConfig, RotationConfig,
    SessionConfig,
};
pub use event::{EventClass, FrameRef, NetworkEvent, PayloadSignal, VerdictSignal};
pub use inference::{
    CallIdentity, DragPath, ImagePart, InferenceRequest, InferenceTask, PathResult, Point,
    PointResult, ProviderErrorKind, ProviderOutcome, StructuredResult,
};
pub use quota::{
    backoff_cooldown_secs, Credential, CredentialModelKey, QuotaRecord, BASE_BACKOFF_SECS,
    DEFAULT_FINGERPRINT_LEN, INSTABILITY_THRESHOLD, MAX_BACKOFF_SECS,
};
pub use session::{
    DispatchSignal, FailureReason, Session, SessionOutcome, SessionReport, SessionState,
};
