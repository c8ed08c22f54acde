//! Port trait definitions (Hexagonal Architecture)
//!
//! - QuotaLedger: persistent credential/model health
//! - Clock: time source for the ledger
//! - ChallengeSurface: page automation collaborator
//! - SolveStrategy / Inference: round solving and the vision calls it makes
//! - InferenceBackend: one raw provider call

pub mod clock;
pub mod inference_backend;
pub mod quota_ledger;
pub mod strategy;
pub mod surface;

pub use clock::{Clock, ManualClock, SystemClock};
pub use inference_backend::InferenceBackend;
pub use quota_ledger::QuotaLedger;
pub use strategy::{DispatchContext, Inference, SolveStrategy};
pub use surface::{ChallengeSurface, SurfaceHandle};
