//! The `relay` module defines what every layer of the pipeline has in common.
//!
//! Each layer (connector, sequencer, batcher) implements [`Relay`] and holds
//! the layer beneath it as an `Arc<R: Relay>`. Events flow upward through
//! handlers registered with [`Relay::on_event`]; sends flow downward through
//! [`Relay::send`].
//!
//! All handlers of a pipeline are invoked from the connector's single
//! dispatcher task, so no two handlers ever run at the same time.

pub mod adapter;
pub mod event;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde_json::Value;

use crate::utils::RelayError;

pub use adapter::{BROADCAST_LABEL, BroadcastAdapter, LocalBroadcaster};
pub use event::{BadDelivery, Delivery, EventHandler, Listeners, PollOutcome, RelayEvent};
pub use pipeline::RelayPipeline;

/// Capability shared by every pipeline layer.
#[async_trait]
pub trait Relay: Send + Sync + 'static {
    /// Brings the layer (and everything beneath it) up. Resolves once the
    /// broker resources are provisioned and polling has been launched.
    async fn start(&self) -> Result<(), RelayError>;

    /// Requests a cooperative stop and resolves once every in-flight poll
    /// has returned.
    async fn stop(&self);

    /// Fire-and-forget send. Failures surface as
    /// [`RelayEvent::SendFailed`], never to the caller.
    fn send(&self, label: &str, args: Value);

    fn on_event(&self, handler: EventHandler);
}
