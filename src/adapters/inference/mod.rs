//! Inference backend adapters.

pub mod mock;
pub mod openai_compat;

pub use mock::{RecordedCall, ScriptedBackend};
pub use openai_compat::OpenAiCompatBackend;
