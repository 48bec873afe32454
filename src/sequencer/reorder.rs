use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::relay::{BadDelivery, Delivery};

/// An arrival waiting for its turn. `args` is `None` for a bad message.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub sender_id: String,
    pub label: String,
    pub args: Option<Value>,
    pub sequence_number: u64,
}

impl PendingMessage {
    pub fn is_malformed(&self) -> bool {
        self.args.is_none()
    }
}

impl From<Delivery> for PendingMessage {
    fn from(delivery: Delivery) -> Self {
        Self {
            sender_id: delivery.sender_id,
            label: delivery.label,
            args: Some(delivery.args),
            sequence_number: delivery.sequence_number,
        }
    }
}

impl From<BadDelivery> for PendingMessage {
    fn from(bad: BadDelivery) -> Self {
        Self {
            sender_id: bad.sender_id,
            label: bad.label,
            args: None,
            sequence_number: bad.sequence_number,
        }
    }
}

/// Turns arrivals in any order into a gap-free ascending run.
///
/// The first arrival fixes where the stream starts. From then on
/// `next_expected` only moves forward and nothing below it is ever held.
#[derive(Debug, Default)]
pub struct ReorderBuffer {
    next_expected: Option<u64>,
    pending: BTreeMap<u64, PendingMessage>,
    // Set once the slot at `u64::MAX` has been released.
    exhausted: bool,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_expected(&self) -> Option<u64> {
        self.next_expected
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Takes one arrival and returns everything that became deliverable,
    /// in sequence order. Malformed entries use up their slot but are not
    /// returned.
    pub fn accept(&mut self, message: PendingMessage) -> Vec<Delivery> {
        let sequence_number = message.sequence_number;
        let next_expected = *self.next_expected.get_or_insert(sequence_number);

        if self.exhausted || sequence_number < next_expected {
            trace!(sequence_number, next_expected, "dropping stale message");
            return Vec::new();
        }

        // A redelivery of a slot still waiting keeps the first copy.
        self.pending.entry(sequence_number).or_insert(message);

        let ready = self.drain(next_expected);
        if ready.is_empty() && !self.pending.is_empty() {
            debug!(
                waiting_for = ?self.next_expected,
                buffered = self.pending.len(),
                "sequence gap, buffering"
            );
        }
        ready
    }

    fn drain(&mut self, mut next: u64) -> Vec<Delivery> {
        let mut ready = Vec::new();
        while let Some(message) = self.pending.remove(&next) {
            match message.args {
                Some(args) => ready.push(Delivery {
                    sender_id: message.sender_id,
                    label: message.label,
                    args,
                    sequence_number: message.sequence_number,
                }),
                None => debug!(sequence_number = next, "skipping bad message"),
            }
            match next.checked_add(1) {
                Some(following) => next = following,
                None => {
                    warn!("sequence numbers exhausted, dropping further arrivals");
                    self.exhausted = true;
                    break;
                }
            }
        }
        self.next_expected = Some(next);
        ready
    }
}
