use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use uuid::Uuid;

use crate::broker::BrokerError;
use crate::broker::message::{Envelope, SubscriptionOptions, TransportMessage};

/// A durable delivery queue bound to a topic.
#[derive(Debug)]
pub struct Subscription {
    pub name: String,
    pub options: SubscriptionOptions,
    queue: VecDeque<TransportMessage>,
}

impl Subscription {
    fn new(name: &str, options: SubscriptionOptions) -> Self {
        Self {
            name: name.to_string(),
            options,
            queue: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// A publish point inside [`MemoryBus`](crate::broker::MemoryBus).
///
/// The topic owns the sequence counter: each published message gets the
/// next number and a copy lands in every subscription bound at that moment.
#[derive(Debug)]
pub struct Topic {
    pub name: String,
    next_sequence: u64,
    subscriptions: HashMap<String, Subscription>,
}

impl Topic {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            next_sequence: 1,
            subscriptions: HashMap::new(),
        }
    }

    /// Binds a new subscription. Returns `false` if the name is taken.
    pub fn subscribe(&mut self, name: &str, options: SubscriptionOptions) -> bool {
        if self.subscriptions.contains_key(name) {
            return false;
        }
        self.subscriptions
            .insert(name.to_string(), Subscription::new(name, options));
        true
    }

    pub fn subscription(&self, name: &str) -> Option<&Subscription> {
        self.subscriptions.get(name)
    }

    /// Assigns the next sequence number and fans the message out.
    pub fn publish(&mut self, envelope: Envelope) -> u64 {
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;

        let enqueued_at = Utc::now();
        for subscription in self.subscriptions.values_mut() {
            subscription.queue.push_back(TransportMessage {
                sender_id: envelope.sender_id.clone(),
                label: envelope.label.clone(),
                body: envelope.body.clone(),
                sequence_number,
                message_id: Uuid::new_v4().to_string(),
                enqueued_at,
            });
        }
        sequence_number
    }

    pub fn pop(&mut self, subscription: &str) -> Result<Option<TransportMessage>, BrokerError> {
        self.subscriptions
            .get_mut(subscription)
            .map(|s| s.queue.pop_front())
            .ok_or_else(|| BrokerError::NotFound(format!("{}|{}", self.name, subscription)))
    }
}
