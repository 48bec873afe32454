use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::broker::{MemoryBus, SubscriptionOptions};
use crate::transport::{ConnectorOptions, RetryPolicy};

/// Top-level configuration of a relay node.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub node: NodeSettings,
    pub connector: ConnectorSettings,
    pub batcher: BatcherSettings,
    pub bus: BusSettings,
    pub log: LogSettings,
}

/// Identity of this node and the broker resources it relays through.
#[derive(Debug, Deserialize, Clone)]
pub struct NodeSettings {
    pub id: String,
    pub topic: String,
    pub subscription: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConnectorSettings {
    pub num_receives: usize,
    pub num_retries: u32,
    pub retry_interval_ms: u64,
    pub auto_delete_on_idle_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatcherSettings {
    pub flush_interval_ms: u64,
}

/// Settings of the in-process broker used by the demo binary.
#[derive(Debug, Deserialize, Clone)]
pub struct BusSettings {
    pub receive_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

impl Settings {
    pub fn connector_options(&self) -> ConnectorOptions {
        ConnectorOptions {
            node_id: self.node.id.clone(),
            topic: self.node.topic.clone(),
            subscription: self.node.subscription.clone(),
            num_receives: self.connector.num_receives,
            retry: RetryPolicy::new(
                self.connector.num_retries,
                Duration::from_millis(self.connector.retry_interval_ms),
            ),
            subscription_options: SubscriptionOptions {
                auto_delete_on_idle: Duration::from_secs(self.connector.auto_delete_on_idle_secs),
            },
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.batcher.flush_interval_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.bus.receive_timeout_ms)
    }
}

/// Partial configuration as read from files or environment. Missing values
/// are filled from [`Settings::default`].
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub node: Option<PartialNodeSettings>,
    pub connector: Option<PartialConnectorSettings>,
    pub batcher: Option<PartialBatcherSettings>,
    pub bus: Option<PartialBusSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialNodeSettings {
    pub id: Option<String>,
    pub topic: Option<String>,
    pub subscription: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialConnectorSettings {
    pub num_receives: Option<usize>,
    pub num_retries: Option<u32>,
    pub retry_interval_ms: Option<u64>,
    pub auto_delete_on_idle_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBatcherSettings {
    pub flush_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBusSettings {
    pub receive_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

/// Node id and subscription name default to fresh UUIDs so that every node
/// gets its own subscription unless told otherwise.
impl Default for Settings {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                id: Uuid::new_v4().to_string(),
                topic: "sbrelay".to_string(),
                subscription: Uuid::new_v4().to_string(),
            },
            connector: ConnectorSettings {
                num_receives: ConnectorOptions::DEFAULT_SIMULTANEOUS_RECEIVES,
                num_retries: RetryPolicy::DEFAULT_ATTEMPTS,
                retry_interval_ms: RetryPolicy::DEFAULT_INTERVAL.as_millis() as u64,
                auto_delete_on_idle_secs: SubscriptionOptions::default()
                    .auto_delete_on_idle
                    .as_secs(),
            },
            batcher: BatcherSettings {
                flush_interval_ms: 250,
            },
            bus: BusSettings {
                receive_timeout_ms: MemoryBus::DEFAULT_RECEIVE_TIMEOUT.as_millis() as u64,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}
