//! The `batcher` module coalesces sends.
//!
//! [`Batcher`] is the top layer of the pipeline. `send` only appends to a
//! pending list; a timer drains the list into one transport message labelled
//! [`BATCH_LABEL`] whose payload is `[[label, args], ...]` in insertion
//! order. On the receive side every batch is exploded back into individual
//! messages, in their original order, tagged with the original sender.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::relay::{Delivery, EventHandler, Listeners, Relay, RelayEvent};
use crate::utils::RelayError;

/// Reserved label of a batch transport message.
pub const BATCH_LABEL: &str = "batch";

/// One `(label, args)` pair of a batch. Serializes as a two-element array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry(pub String, pub Value);

pub struct Batcher<R: Relay> {
    inner: Arc<R>,
    listeners: Arc<Listeners>,
    pending: Arc<Mutex<Vec<BatchEntry>>>,
    flush_interval: Duration,
    flusher: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    // Advances on every stop.
    epoch: AtomicU64,
}

impl<R: Relay> Batcher<R> {
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(250);

    pub fn new(inner: Arc<R>, flush_interval: Duration) -> Self {
        let listeners = Arc::new(Listeners::default());
        let upward = listeners.clone();
        inner.on_event(Arc::new(move |event| explode(&upward, event)));

        Self {
            inner,
            listeners,
            pending: Arc::new(Mutex::new(Vec::new())),
            flush_interval: flush_interval.max(Duration::from_millis(1)),
            flusher: Mutex::new(None),
            started: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &Arc<R> {
        &self.inner
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Sends whatever is pending right now as one batch.
    pub fn flush(&self) {
        flush_pending(self.inner.as_ref(), &self.pending);
    }

    fn spawn_flusher(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let pending = self.pending.clone();
        let period = self.flush_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                flush_pending(inner.as_ref(), &pending);
            }
        })
    }
}

fn lock(pending: &Mutex<Vec<BatchEntry>>) -> MutexGuard<'_, Vec<BatchEntry>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn flush_pending<R: Relay>(inner: &R, pending: &Mutex<Vec<BatchEntry>>) {
    let batch = std::mem::take(&mut *lock(pending));
    if batch.is_empty() {
        return;
    }

    let count = batch.len();
    match serde_json::to_value(batch) {
        Ok(payload) => {
            debug!(count, "flushing batch");
            inner.send(BATCH_LABEL, payload);
        }
        Err(err) => error!(count, "dropping batch that failed to serialize: {err}"),
    }
}

fn explode(listeners: &Listeners, event: RelayEvent) {
    match event {
        RelayEvent::Message(delivery) if delivery.label == BATCH_LABEL => {
            let Delivery {
                sender_id,
                args,
                sequence_number,
                ..
            } = delivery;
            match serde_json::from_value::<Vec<BatchEntry>>(args) {
                Ok(entries) => {
                    for BatchEntry(label, args) in entries {
                        listeners.emit(RelayEvent::Message(Delivery {
                            sender_id: sender_id.clone(),
                            label,
                            args,
                            sequence_number,
                        }));
                    }
                }
                Err(err) => warn!(
                    from = %sender_id,
                    sequence_number,
                    "discarding malformed batch: {err}"
                ),
            }
        }
        other => listeners.emit(other),
    }
}

#[async_trait]
impl<R: Relay> Relay for Batcher<R> {
    async fn start(&self) -> Result<(), RelayError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let epoch = self.epoch.load(Ordering::SeqCst);
        if let Err(err) = self.inner.start().await {
            if self.epoch.load(Ordering::SeqCst) == epoch {
                self.started.store(false, Ordering::SeqCst);
            }
            return Err(err);
        }

        let mut flusher = self.flusher.lock().unwrap_or_else(PoisonError::into_inner);
        // `stop` advances the epoch before it takes this lock.
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("stopped while starting, flush timer not started");
            return Ok(());
        }
        if let Some(previous) = flusher.replace(self.spawn_flusher()) {
            previous.abort();
        }
        Ok(())
    }

    async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let flusher = self
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(flusher) = flusher {
            flusher.abort();
        }
        self.flush();
        self.inner.stop().await;
    }

    fn send(&self, label: &str, args: Value) {
        lock(&self.pending).push(BatchEntry(label.to_string(), args));
    }

    fn on_event(&self, handler: EventHandler) {
        self.listeners.add(handler);
    }
}

#[cfg(test)]
mod tests;
