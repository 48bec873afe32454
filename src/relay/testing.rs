//! Test doubles shared by the layer tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::broker::BrokerError;
use crate::relay::{BadDelivery, Delivery, EventHandler, Listeners, Relay, RelayEvent};
use crate::utils::RelayError;

/// Stand-in for an inner layer: records calls and lets a test push events
/// upward as if they came from below.
#[derive(Default)]
pub struct FakeRelay {
    listeners: Listeners,
    sent: Mutex<Vec<(String, Value)>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_start: AtomicBool,
    start_delay: Duration,
}

impl FakeRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let relay = Self::default();
        relay.fail_start.store(true, Ordering::SeqCst);
        Arc::new(relay)
    }

    /// A relay whose `start` takes `delay` to complete.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            start_delay: delay,
            ..Self::default()
        })
    }

    pub fn emit(&self, event: RelayEvent) {
        self.listeners.emit(event);
    }

    pub fn deliver(&self, sender_id: &str, label: &str, args: Value, sequence_number: u64) {
        self.emit(RelayEvent::Message(Delivery {
            sender_id: sender_id.to_string(),
            label: label.to_string(),
            args,
            sequence_number,
        }));
    }

    pub fn deliver_bad(&self, sender_id: &str, label: &str, sequence_number: u64) {
        self.emit(RelayEvent::BadMessage(BadDelivery {
            sender_id: sender_id.to_string(),
            label: label.to_string(),
            sequence_number,
        }));
    }

    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[async_trait]
impl Relay for FakeRelay {
    async fn start(&self) -> Result<(), RelayError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(RelayError::Provisioning {
                entity: "topic 'fake'".to_string(),
                source: BrokerError::Request("denied".to_string()),
            });
        }
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn send(&self, label: &str, args: Value) {
        self.sent.lock().unwrap().push((label.to_string(), args));
    }

    fn on_event(&self, handler: EventHandler) {
        self.listeners.add(handler);
    }
}

/// Handler that stores every event it sees.
pub fn recorder() -> (EventHandler, Arc<Mutex<Vec<RelayEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let handler: EventHandler = Arc::new(move |event| sink.lock().unwrap().push(event));
    (handler, events)
}

pub fn deliveries(events: &Mutex<Vec<RelayEvent>>) -> Vec<Delivery> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            RelayEvent::Message(delivery) => Some(delivery.clone()),
            _ => None,
        })
        .collect()
}
