//! Solve strategy and inference ports.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, InferenceError};
use crate::domain::models::{
    ChallengePayload, ChallengeRoute, DispatchSignal, ImagePart, PathResult, PointResult,
    StructuredResult,
};

use super::surface::SurfaceHandle;

/// Vision inference capabilities offered to strategies.
#[async_trait]
pub trait Inference: Send + Sync {
    /// Judge which images match the prompt.
    ///
    /// `preferred_model` moves that model to the front of the rotation for this call only.
    async fn classify(
        &self,
        images: Vec<ImagePart>,
        prompt: &str,
        preferred_model: Option<&str>,
    ) -> Result<StructuredResult, InferenceError>;

    /// Locate click points on a gridded image.
    async fn locate_points(
        &self,
        images: Vec<ImagePart>,
        grid: ImagePart,
        prompt: &str,
        preferred_model: Option<&str>,
    ) -> Result<PointResult, InferenceError>;

    /// Locate drag paths on a gridded image.
    async fn locate_paths(
        &self,
        images: Vec<ImagePart>,
        grid: ImagePart,
        prompt: &str,
        preferred_model: Option<&str>,
    ) -> Result<PathResult, InferenceError>;
}

/// Everything a strategy receives for one dispatch.
pub struct DispatchContext<'a> {
    /// Session the round belongs to.
    pub session_id: Uuid,
    /// Payload of the current round.
    pub payload: &'a ChallengePayload,
    /// Strategy route chosen for the payload.
    pub route: ChallengeRoute,
    /// Surface to submit through.
    pub surface: &'a SurfaceHandle,
    /// Rotating inference for model calls.
    pub inference: Arc<dyn Inference>,
}

/// Answers one challenge round on the page.
#[async_trait]
pub trait SolveStrategy: Send + Sync {
    /// Solve and submit the current round.
    ///
    /// `Ok(DispatchSignal::Failed)` and `Err(_)` are both treated as a failed round.
    async fn solve(&self, ctx: &DispatchContext<'_>) -> DomainResult<DispatchSignal>;
}
