//! The `broker` module is the seam between the relay and the message broker.
//!
//! The relay only ever needs four broker operations: idempotent creation of a
//! topic and of a subscription, a blocking receive, and a send. They are
//! captured by the [`ServiceBus`] trait so the transport layer can run
//! against a real broker client, the in-process [`MemoryBus`], or a scripted
//! fake in tests.

pub mod engine;
pub mod message;
pub mod topic;

use async_trait::async_trait;
use thiserror::Error;

pub use engine::MemoryBus;
pub use message::{Envelope, SubscriptionOptions, TransportMessage};

/// Errors reported by a broker call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The entity being created is already there. Provisioning treats this
    /// as success.
    #[error("entity '{0}' already exists")]
    AlreadyExists(String),

    #[error("entity '{0}' not found")]
    NotFound(String),

    /// A receive completed without a message.
    #[error("no messages to receive")]
    NoMessages,

    #[error("broker request failed: {0}")]
    Request(String),
}

/// Operations a topic/subscription broker offers to the relay.
///
/// Delivery is at-least-once and unordered. Every received message carries
/// the sequence number the broker assigned when the message was published.
#[async_trait]
pub trait ServiceBus: Send + Sync {
    async fn create_topic(&self, topic: &str) -> Result<(), BrokerError>;

    async fn create_subscription(
        &self,
        topic: &str,
        subscription: &str,
        options: &SubscriptionOptions,
    ) -> Result<(), BrokerError>;

    /// Waits for the next message on a subscription. Implementations are
    /// expected to give up after their own receive timeout with
    /// [`BrokerError::NoMessages`].
    async fn receive_subscription_message(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Result<TransportMessage, BrokerError>;

    async fn send_topic_message(&self, topic: &str, message: Envelope) -> Result<(), BrokerError>;
}

#[cfg(test)]
mod tests;
