//! Turns captured network responses into bootstrap, payload and verdict signals.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::models::{
    ChallengePayload, ChallengeVerdict, EventClass, InterceptorConfig, NetworkEvent, PayloadSignal,
};
use crate::domain::ports::ChallengeSurface;

use super::signal_queue::SignalSink;

/// Routes intercepted responses into the signal queues.
pub struct EventInterceptor {
    config: InterceptorConfig,
    surface: Arc<dyn ChallengeSurface>,
    sink: SignalSink,
    injected: Mutex<HashSet<[u8; 32]>>,
}

impl EventInterceptor {
    /// Interceptor feeding `sink`.
    pub fn new(config: InterceptorConfig, surface: Arc<dyn ChallengeSurface>, sink: SignalSink) -> Self {
        Self {
            config,
            surface,
            sink,
            injected: Mutex::new(HashSet::new()),
        }
    }

    /// Classify a response by its URL path, ignoring query and fragment.
    pub fn classify(&self, url: &str) -> EventClass {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.ends_with(&self.config.bootstrap_suffix) {
            EventClass::Bootstrap
        } else if url.contains(&self.config.payload_pattern) {
            EventClass::Payload
        } else if url.contains(&self.config.verdict_pattern) {
            EventClass::Verdict
        } else {
            EventClass::Ignored
        }
    }

    /// Handle one event. Never fails; problems are logged.
    pub async fn handle(&self, event: &NetworkEvent) -> EventClass {
        let class = self.classify(&event.url);
        match class {
            EventClass::Bootstrap => self.on_bootstrap(event).await,
            EventClass::Payload => self.on_payload(event).await,
            EventClass::Verdict => self.on_verdict(event),
            EventClass::Ignored => {}
        }
        class
    }

    async fn on_bootstrap(&self, event: &NetworkEvent) {
        let digest: [u8; 32] = Sha256::digest(&event.body).into();
        if self.injected.lock().unwrap_or_else(PoisonError::into_inner).contains(&digest) {
            tracing::debug!(url = %event.url, "bootstrap script already injected");
            return;
        }

        let script = String::from_utf8_lossy(&event.body);
        let page_ok = match self.surface.inject_script(&script, None).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(url = %event.url, error = %e, "failed to inject bootstrap into page");
                false
            }
        };
        if let Some(frame) = &event.frame {
            if let Err(e) = self.surface.inject_script(&script, Some(frame)).await {
                tracing::warn!(url = %event.url, frame = %frame.0, error = %e, "failed to inject bootstrap into frame");
            }
        }
        if let Err(e) = self.surface.add_init_script(&script).await {
            tracing::warn!(url = %event.url, error = %e, "failed to register bootstrap init script");
        }

        if page_ok {
            self.injected.lock().unwrap_or_else(PoisonError::into_inner).insert(digest);
            tracing::debug!(url = %event.url, bytes = event.body.len(), "bootstrap script injected");
        }
    }

    async fn on_payload(&self, event: &NetworkEvent) {
        if event.is_json() {
            let value = match event.json_body() {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(url = %event.url, error = %e, "unreadable payload response");
                    self.publish_payload(None);
                    return;
                }
            };

            if value.get("pass").and_then(Value::as_bool) == Some(true) {
                match ChallengeVerdict::from_value(value) {
                    Ok(verdict) => {
                        tracing::info!("payload endpoint returned a passing verdict");
                        self.sink.publish_verdict(verdict);
                    }
                    Err(e) => tracing::warn!(error = %e, "unparseable verdict on payload endpoint"),
                }
            } else if value.get("request_config").is_some() {
                self.publish_payload(parse_payload(value));
            } else {
                tracing::debug!(url = %event.url, "ignoring payload response without challenge");
            }
            return;
        }

        let decoded = match self.surface.decode_blob(&event.body, event.frame.as_ref()).await {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(url = %event.url, error = %e, "payload decode failed");
                None
            }
        };
        self.publish_payload(decoded.and_then(parse_payload));
    }

    fn on_verdict(&self, event: &NetworkEvent) {
        let verdict = event
            .json_body()
            .map_err(|e| e.to_string())
            .and_then(|value| ChallengeVerdict::from_value(value).map_err(|e| e.to_string()));
        match verdict {
            Ok(verdict) => {
                tracing::info!(pass = verdict.pass, "verdict received");
                self.sink.publish_verdict(verdict);
            }
            Err(e) => tracing::warn!(url = %event.url, error = %e, "dropping unparseable verdict"),
        }
    }

    fn publish_payload(&self, payload: PayloadSignal) {
        let readable = payload.is_some();
        if !self.sink.publish_payload(payload) {
            tracing::debug!("no session is listening for payloads");
        } else if readable {
            tracing::info!("challenge payload captured");
        }
    }
}

fn parse_payload(value: Value) -> PayloadSignal {
    match ChallengePayload::from_value(value) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::warn!(error = %e, "payload does not match the expected shape");
            None
        }
    }
}
