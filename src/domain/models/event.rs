//! Intercepted network events and the signals derived from them.

use serde_json::Value;

use super::challenge::{ChallengePayload, ChallengeVerdict};

/// Opaque reference to the frame that produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameRef(pub String);

/// One captured network response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEvent {
    /// Response URL.
    pub url: String,
    /// `Content-Type` header, when present.
    pub content_type: Option<String>,
    /// Raw response body.
    pub body: Vec<u8>,
    /// Frame the response was loaded in.
    pub frame: Option<FrameRef>,
}

impl NetworkEvent {
    /// Event with no content type or frame.
    pub fn new(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            content_type: None,
            body: body.into(),
            frame: None,
        }
    }

    /// Set the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the originating frame.
    #[must_use]
    pub fn with_frame(mut self, frame: FrameRef) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Whether the content type is JSON.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
    }

    /// Parse the body as JSON.
    pub fn json_body(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// URL class of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// Page script that must be injected.
    Bootstrap,
    /// Challenge payload endpoint.
    Payload,
    /// Verdict endpoint.
    Verdict,
    /// Anything else.
    Ignored,
}

/// Payload queue item. `None` means a round arrived but could not be read.
pub type PayloadSignal = Option<ChallengePayload>;

/// Verdict slot item.
pub type VerdictSignal = ChallengeVerdict;
