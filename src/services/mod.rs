//! Orchestration services
//!
//! Session control, signal queues and event interception on one side; rotation,
//! the provider ring and the inference gateway on the other.

pub mod event_interceptor;
pub mod inference_gateway;
pub mod metrics;
pub mod provider_ring;
pub mod rotation_scheduler;
pub mod session_controller;
pub mod signal_queue;
pub mod verdict_archive;

pub use event_interceptor::EventInterceptor;
pub use inference_gateway::InferenceGateway;
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use provider_ring::ProviderRing;
pub use rotation_scheduler::{Candidate, RotationScheduler};
pub use session_controller::SessionController;
pub use signal_queue::{signal_channel, PayloadReceiver, SignalSink, SignalSource, VerdictReceiver};
pub use verdict_archive::VerdictArchive;
