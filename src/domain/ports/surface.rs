//! Challenge surface port - the browser automation collaborator.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::models::FrameRef;

/// Handle to a located challenge surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceHandle {
    /// Frame hosting the challenge content, when known.
    pub frame: Option<FrameRef>,
    /// Free-form description for logs.
    pub label: String,
}

/// Page-side operations the session controller and interceptor rely on.
///
/// Pointer mechanics and frame discovery live behind this trait.
#[async_trait]
pub trait ChallengeSurface: Send + Sync {
    /// Locate the challenge widget. `None` means there is nothing to solve.
    async fn locate_surface(&self) -> DomainResult<Option<SurfaceHandle>>;

    /// Reload the hosting page.
    async fn reload(&self) -> DomainResult<()>;

    /// Click the challenge checkbox to request a new challenge.
    async fn click_checkbox(&self) -> DomainResult<()>;

    /// Ask the widget for a different challenge.
    async fn refresh_challenge(&self) -> DomainResult<()>;

    /// Read the pass token from the page after a passing verdict.
    async fn extract_token(&self) -> DomainResult<Option<String>>;

    /// Read the prompt currently displayed by the widget.
    async fn read_prompt(&self) -> DomainResult<Option<String>> {
        Ok(None)
    }

    /// Evaluate a script in the page, and in `frame` when given.
    async fn inject_script(&self, script: &str, frame: Option<&FrameRef>) -> DomainResult<()>;

    /// Register a script to run in every new document.
    async fn add_init_script(&self, script: &str) -> DomainResult<()>;

    /// Run the page-side decode transform over an encoded payload blob.
    async fn decode_blob(&self, body: &[u8], frame: Option<&FrameRef>)
        -> DomainResult<Option<Value>>;
}
