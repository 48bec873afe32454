//! The `error` module defines the errors surfaced by the relay pipeline.
//!
//! Only provisioning failures and configuration problems are ever returned to
//! a caller. Transport failures travel upward as events, and malformed
//! payloads become bad-message markers.

use thiserror::Error;

use crate::broker::BrokerError;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Creating the topic or subscription failed for a reason other than
    /// "already exists".
    #[error("failed to provision {entity}: {source}")]
    Provisioning {
        entity: String,
        #[source]
        source: BrokerError,
    },

    /// A send was abandoned after every retry attempt failed.
    #[error("send to topic '{topic}' failed after {attempts} attempts: {source}")]
    Transport {
        topic: String,
        attempts: u32,
        #[source]
        source: BrokerError,
    },

    #[error("failed to serialize payload for '{label}': {source}")]
    Serialize {
        label: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
