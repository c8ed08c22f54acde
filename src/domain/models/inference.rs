//! Inference request/response models and the tagged provider outcome.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use super::quota::Credential;

/// An image already rendered by the capture collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePart {
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

impl ImagePart {
    /// PNG image from base64 data.
    pub fn png(data: impl Into<String>) -> Self {
        Self {
            mime_type: "image/png".to_string(),
            data: data.into(),
        }
    }

    /// `data:` URL for the image.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// The three inference capabilities strategies rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceTask {
    /// Image classification.
    Classify,
    /// Click-point location.
    LocatePoints,
    /// Drag-path location.
    LocatePaths,
}

impl InferenceTask {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::LocatePoints => "locate_points",
            Self::LocatePaths => "locate_paths",
        }
    }
}

/// A single provider-agnostic inference request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Capability requested.
    pub task: InferenceTask,
    /// Images to reason over.
    pub images: Vec<ImagePart>,
    /// Coordinate grid overlay for spatial tasks.
    pub grid: Option<ImagePart>,
    /// Challenge prompt.
    pub prompt: String,
    /// Optional system instruction.
    pub description: Option<String>,
    /// Model tried first for this request, ahead of the configured priority.
    #[serde(default)]
    pub preferred_model: Option<String>,
}

/// Credential and model used for one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallIdentity {
    /// Credential for the call.
    pub credential: Credential,
    /// Model for the call.
    pub model: String,
}

/// Result of `classify`: indices of the images judged to match, plus raw output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredResult {
    /// Indices of the matching images.
    #[serde(default)]
    pub selected: Vec<usize>,
    /// Prompt as the model read it.
    #[serde(default)]
    pub challenge_prompt: Option<String>,
    /// Model notes, kept for debugging.
    #[serde(default)]
    pub log_message: Option<Value>,
}

/// Grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// Result of `locate_points`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointResult {
    /// Points to click.
    #[serde(default)]
    pub points: Vec<Point>,
    /// Model notes, kept for debugging.
    #[serde(default)]
    pub log_message: Option<Value>,
}

/// One drag move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DragPath {
    /// Where the drag starts.
    pub start: Point,
    /// Where the drag ends.
    pub end: Point,
}

/// Result of `locate_paths`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    /// Moves to perform.
    #[serde(default)]
    pub paths: Vec<DragPath>,
    /// Model notes, kept for debugging.
    #[serde(default)]
    pub log_message: Option<Value>,
}

/// Classified provider failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Rate limit / quota signal (HTTP 429, `RESOURCE_EXHAUSTED`).
    QuotaExhausted {
        /// Provider hint, buffer included.
        retry_after: Option<Duration>,
        /// The provider reported a per-day quota.
        daily: bool,
    },
    /// HTTP 5xx.
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Redacted, truncated response body.
        message: String,
    },
    /// Any other non-2xx.
    ClientError {
        /// HTTP status code.
        status: u16,
        /// Redacted, truncated response body.
        message: String,
    },
    /// Body was not the expected JSON.
    MalformedResponse(String),
    /// Transport failure.
    Network(String),
    /// Request exceeded its timeout.
    Timeout,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuotaExhausted { retry_after: Some(d), .. } => {
                write!(f, "quota exhausted (retry after {}s)", d.as_secs())
            }
            Self::QuotaExhausted { daily: true, .. } => write!(f, "daily quota exhausted"),
            Self::QuotaExhausted { .. } => write!(f, "quota exhausted"),
            Self::ServerError { status, message } => write!(f, "server error ({status}): {message}"),
            Self::ClientError { status, message } => write!(f, "client error ({status}): {message}"),
            Self::MalformedResponse(msg) => write!(f, "malformed response: {msg}"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Timeout => write!(f, "request timeout"),
        }
    }
}

/// Tagged result of one provider call.
///
/// `Transient` failures are quota signals: the key cools down and rotation moves on.
/// `Unstable` failures count towards the key's instability threshold.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome<T> {
    /// Successful call.
    Ok(T),
    /// Quota signal.
    Transient(ProviderErrorKind),
    /// Any other failure.
    Unstable(ProviderErrorKind),
}

impl<T> ProviderOutcome<T> {
    /// Classify a failure kind into its outcome tag.
    pub fn failure(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::QuotaExhausted { .. } => Self::Transient(kind),
            other => Self::Unstable(other),
        }
    }
}
