//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty formatting
//! - Rolling log files with retention
//! - Secret redaction for provider payloads

pub mod logger;
pub mod redact;
pub mod retention;

pub use logger::LoggerImpl;
pub use redact::redact_secrets;
pub use retention::LogRetention;
