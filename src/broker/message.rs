use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message on its way to the broker.
///
/// `sender_id` travels as the broker's correlation id and `label` as its
/// label property. The body is the JSON-serialized argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender_id: String,
    pub label: String,
    pub body: Vec<u8>,
}

impl Envelope {
    pub fn pack(sender_id: &str, label: &str, args: &Value) -> Result<Self, serde_json::Error> {
        Ok(Self {
            sender_id: sender_id.to_string(),
            label: label.to_string(),
            body: serde_json::to_vec(args)?,
        })
    }
}

/// A message as handed back by a receive.
///
/// `sequence_number` is assigned by the broker at publish time and is
/// strictly increasing in publish order across every sender on the topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMessage {
    pub sender_id: String,
    pub label: String,
    pub body: Vec<u8>,
    pub sequence_number: u64,
    pub message_id: String,
    pub enqueued_at: DateTime<Utc>,
}

impl TransportMessage {
    pub fn size(&self) -> usize {
        self.body.len()
    }
}

/// Options applied when a subscription is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Idle period after which the broker may drop the subscription.
    pub auto_delete_on_idle: Duration,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            auto_delete_on_idle: Duration::from_secs(5 * 60),
        }
    }
}
