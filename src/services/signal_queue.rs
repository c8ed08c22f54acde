//! Queues that carry intercepted signals to the session controller.
//!
//! Payloads are FIFO and unbounded. Verdicts live in a single slot where the latest
//! value wins. Both receive operations are cancel-safe, so they can race in `select!`
//! without losing a signal.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, Notify};

use crate::domain::models::{PayloadSignal, VerdictSignal};

/// Create a connected sink/source pair.
pub fn signal_channel() -> (SignalSink, SignalSource) {
    let (payload_tx, payload_rx) = mpsc::unbounded_channel();
    let slot = Arc::new(LatestSlot::default());
    (
        SignalSink {
            payloads: payload_tx,
            verdicts: slot.clone(),
        },
        SignalSource {
            payloads: PayloadReceiver { rx: payload_rx },
            verdicts: VerdictReceiver { slot },
        },
    )
}

#[derive(Debug)]
struct LatestSlot<T> {
    value: Mutex<Option<T>>,
    notify: Notify,
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self {
            value: Mutex::new(None),
            notify: Notify::new(),
        }
    }
}

impl<T> LatestSlot<T> {
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value`, returning whether an unread value was replaced.
    fn put(&self, value: T) -> bool {
        let replaced = self.lock().replace(value).is_some();
        self.notify.notify_one();
        replaced
    }

    fn take_now(&self) -> Option<T> {
        self.lock().take()
    }

    async fn take(&self) -> T {
        loop {
            if let Some(value) = self.take_now() {
                return value;
            }
            self.notify.notified().await;
        }
    }
}

/// Producer side, held by the event interceptor.
#[derive(Debug, Clone)]
pub struct SignalSink {
    payloads: mpsc::UnboundedSender<PayloadSignal>,
    verdicts: Arc<LatestSlot<VerdictSignal>>,
}

impl SignalSink {
    /// Enqueue a payload. Returns `false` when the controller side is gone.
    pub fn publish_payload(&self, payload: PayloadSignal) -> bool {
        self.payloads.send(payload).is_ok()
    }

    /// Replace the pending verdict, if any.
    pub fn publish_verdict(&self, verdict: VerdictSignal) {
        if self.verdicts.put(verdict) {
            tracing::debug!("superseded unread verdict");
        }
    }
}

/// Consumer side, owned by the session controller.
#[derive(Debug)]
pub struct SignalSource {
    /// Challenge payloads in arrival order.
    pub payloads: PayloadReceiver,
    /// Latest verdict only.
    pub verdicts: VerdictReceiver,
}

impl SignalSource {
    /// Discard everything queued so far.
    pub fn drain(&mut self) {
        let payloads = self.payloads.drain();
        let verdict = self.verdicts.clear();
        if payloads > 0 || verdict {
            tracing::debug!(payloads, verdict, "discarded stale signals");
        }
    }
}

/// FIFO of intercepted payloads.
#[derive(Debug)]
pub struct PayloadReceiver {
    rx: mpsc::UnboundedReceiver<PayloadSignal>,
}

impl PayloadReceiver {
    /// Next payload in arrival order. `None` once every sink is dropped.
    pub async fn recv(&mut self) -> Option<PayloadSignal> {
        self.rx.recv().await
    }

    /// Drop every queued payload and return how many there were.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}

/// Single-slot verdict mailbox; a newer verdict replaces an unread one.
#[derive(Debug)]
pub struct VerdictReceiver {
    slot: Arc<LatestSlot<VerdictSignal>>,
}

impl VerdictReceiver {
    /// Wait for and consume the latest verdict.
    pub async fn recv(&self) -> VerdictSignal {
        self.slot.take().await
    }

    /// Consume the latest verdict without waiting.
    pub fn try_recv(&self) -> Option<VerdictSignal> {
        self.slot.take_now()
    }

    /// Drop the pending verdict. Returns whether one was pending.
    pub fn clear(&self) -> bool {
        self.slot.take_now().is_some()
    }
}
