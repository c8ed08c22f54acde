//! Domain layer for the challenge pilot
//!
//! This module contains core models, errors and the port traits that the
//! adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult, InferenceError};
