use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::broker::message::{Envelope, SubscriptionOptions, TransportMessage};
use crate::broker::topic::Topic;
use crate::broker::{BrokerError, ServiceBus};

/// In-process broker with topic/subscription semantics.
///
/// Creation calls fail with [`BrokerError::AlreadyExists`] when the entity is
/// present, the same way a hosted broker answers a racing create. Receives
/// long-poll until a message arrives or `receive_timeout` passes.
#[derive(Debug)]
pub struct MemoryBus {
    topics: Mutex<HashMap<String, Topic>>,
    arrivals: Notify,
    receive_timeout: Duration,
}

impl MemoryBus {
    pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn new(receive_timeout: Duration) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            arrivals: Notify::new(),
            receive_timeout,
        }
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics().contains_key(topic)
    }

    pub fn subscription_options(&self, topic: &str, subscription: &str) -> Option<SubscriptionOptions> {
        self.topics()
            .get(topic)
            .and_then(|t| t.subscription(subscription))
            .map(|s| s.options.clone())
    }

    /// Number of messages waiting on a subscription.
    pub fn backlog(&self, topic: &str, subscription: &str) -> usize {
        self.topics()
            .get(topic)
            .and_then(|t| t.subscription(subscription))
            .map_or(0, |s| s.len())
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RECEIVE_TIMEOUT)
    }
}

#[async_trait]
impl ServiceBus for MemoryBus {
    async fn create_topic(&self, topic: &str) -> Result<(), BrokerError> {
        let mut topics = self.topics();
        if topics.contains_key(topic) {
            return Err(BrokerError::AlreadyExists(topic.to_string()));
        }
        topics.insert(topic.to_string(), Topic::new(topic));
        debug!(topic, "topic created");
        Ok(())
    }

    async fn create_subscription(
        &self,
        topic: &str,
        subscription: &str,
        options: &SubscriptionOptions,
    ) -> Result<(), BrokerError> {
        let mut topics = self.topics();
        let entry = topics
            .get_mut(topic)
            .ok_or_else(|| BrokerError::NotFound(topic.to_string()))?;
        if !entry.subscribe(subscription, options.clone()) {
            return Err(BrokerError::AlreadyExists(format!("{topic}|{subscription}")));
        }
        debug!(topic, subscription, "subscription created");
        Ok(())
    }

    async fn receive_subscription_message(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Result<TransportMessage, BrokerError> {
        let deadline = Instant::now() + self.receive_timeout;
        loop {
            // Registered before the queue check so a publish in between is not missed.
            let arrived = self.arrivals.notified();
            {
                let mut topics = self.topics();
                let entry = topics
                    .get_mut(topic)
                    .ok_or_else(|| BrokerError::NotFound(topic.to_string()))?;
                if let Some(message) = entry.pop(subscription)? {
                    return Ok(message);
                }
            }
            if tokio::time::timeout_at(deadline, arrived).await.is_err() {
                return Err(BrokerError::NoMessages);
            }
        }
    }

    async fn send_topic_message(&self, topic: &str, message: Envelope) -> Result<(), BrokerError> {
        let sequence_number = {
            let mut topics = self.topics();
            let entry = topics
                .get_mut(topic)
                .ok_or_else(|| BrokerError::NotFound(topic.to_string()))?;
            entry.publish(message)
        };
        debug!(topic, sequence_number, "message enqueued");
        self.arrivals.notify_waiters();
        Ok(())
    }
}
