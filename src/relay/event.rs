use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::broker::{BrokerError, TransportMessage};
use crate::utils::RelayError;

/// A successfully decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub sender_id: String,
    pub label: String,
    pub args: Value,
    /// Broker-assigned sequence number of the transport message this came
    /// from. Entries exploded out of one batch share their batch's number.
    pub sequence_number: u64,
}

/// A transport message whose payload could not be decoded. It keeps its
/// sequence slot so the sequencer can skip past it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadDelivery {
    pub sender_id: String,
    pub label: String,
    pub sequence_number: u64,
}

/// Result of one completed receive.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub error: Option<BrokerError>,
    pub message: Option<TransportMessage>,
}

#[derive(Debug, Clone)]
pub enum RelayEvent {
    Message(Delivery),
    /// Only travels between the connector and the sequencer.
    BadMessage(BadDelivery),
    Poll(PollOutcome),
    SendFailed(Arc<RelayError>),
}

impl RelayEvent {
    /// `poll` and `sberror` events, which every layer forwards untouched.
    pub fn is_operational(&self) -> bool {
        matches!(self, RelayEvent::Poll(_) | RelayEvent::SendFailed(_))
    }
}

pub type EventHandler = Arc<dyn Fn(RelayEvent) + Send + Sync>;

/// Registered handlers of one layer.
#[derive(Default)]
pub struct Listeners {
    handlers: Mutex<Vec<EventHandler>>,
}

impl Listeners {
    pub fn add(&self, handler: EventHandler) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every handler in registration order. The handler list is
    /// snapshotted first so a handler may register further handlers.
    pub fn emit(&self, event: RelayEvent) {
        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if let Some((last, rest)) = handlers.split_last() {
            for handler in rest {
                handler(event.clone());
            }
            last(event);
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("handlers", &self.len())
            .finish()
    }
}
