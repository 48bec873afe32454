//! The `sequencer` module restores a single global order.
//!
//! The broker stamps each message with a per-topic sequence number but
//! hands messages out in any order. [`Sequencer`] sits on top of the
//! connector, holds early arrivals in a [`ReorderBuffer`] and releases them
//! strictly in sequence order, each exactly once. Bad messages fill their
//! slot and are dropped when their turn comes.

pub mod reorder;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::relay::{EventHandler, Listeners, Relay, RelayEvent};
use crate::utils::RelayError;

pub use reorder::{PendingMessage, ReorderBuffer};

#[derive(Debug, Default)]
struct SequencerCore {
    buffer: Mutex<ReorderBuffer>,
    listeners: Listeners,
}

impl SequencerCore {
    fn buffer(&self) -> MutexGuard<'_, ReorderBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe(&self, event: RelayEvent) {
        match event {
            RelayEvent::Message(delivery) => self.accept(delivery.into()),
            RelayEvent::BadMessage(bad) => self.accept(bad.into()),
            operational => self.listeners.emit(operational),
        }
    }

    fn accept(&self, message: PendingMessage) {
        let ready = self.buffer().accept(message);
        for delivery in ready {
            self.listeners.emit(RelayEvent::Message(delivery));
        }
    }
}

pub struct Sequencer<R: Relay> {
    inner: Arc<R>,
    core: Arc<SequencerCore>,
    started: AtomicBool,
}

impl<R: Relay> Sequencer<R> {
    pub fn new(inner: Arc<R>) -> Self {
        let core = Arc::new(SequencerCore::default());
        let observer = core.clone();
        inner.on_event(Arc::new(move |event| observer.observe(event)));

        Self {
            inner,
            core,
            started: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &Arc<R> {
        &self.inner
    }

    pub fn next_expected(&self) -> Option<u64> {
        self.core.buffer().next_expected()
    }

    pub fn pending_len(&self) -> usize {
        self.core.buffer().pending_len()
    }
}

#[async_trait]
impl<R: Relay> Relay for Sequencer<R> {
    async fn start(&self) -> Result<(), RelayError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(err) = self.inner.start().await {
            self.started.store(false, Ordering::SeqCst);
            return Err(err);
        }
        Ok(())
    }

    async fn stop(&self) {
        if self.started.swap(false, Ordering::SeqCst) {
            self.inner.stop().await;
        }
    }

    fn send(&self, label: &str, args: Value) {
        self.inner.send(label, args);
    }

    fn on_event(&self, handler: EventHandler) {
        self.core.listeners.add(handler);
    }
}
