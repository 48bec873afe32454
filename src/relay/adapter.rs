//! Broadcast adapter
//!
//! Glue between the relay pipeline and the broadcasting layer that owns the
//! client sessions. A local broadcast is handed to the [`LocalBroadcaster`]
//! and relayed to the other nodes under [`BROADCAST_LABEL`]; a relayed
//! broadcast from another node goes to the local broadcaster only. Messages
//! this node sent itself come back through the broker and are ignored.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::relay::{Relay, RelayEvent};
use crate::utils::RelayError;

/// Label of relayed broadcasts. Payload is `[packet, opts]`.
pub const BROADCAST_LABEL: &str = "iomsg";

/// The broadcasting layer's local fan-out to connected clients.
pub trait LocalBroadcaster: Send + Sync + 'static {
    fn broadcast(&self, packet: &Value, opts: &Value);
}

type StartOutcome = Option<Result<(), Arc<RelayError>>>;

pub struct BroadcastAdapter<R: Relay> {
    node_id: String,
    relay: Arc<R>,
    local: Arc<dyn LocalBroadcaster>,
    started: watch::Sender<StartOutcome>,
}

impl<R: Relay> BroadcastAdapter<R> {
    pub fn new(node_id: impl Into<String>, relay: Arc<R>, local: Arc<dyn LocalBroadcaster>) -> Self {
        let node_id = node_id.into();
        let (started, _) = watch::channel(None);

        let own_id = node_id.clone();
        let sink = local.clone();
        relay.on_event(Arc::new(move |event| {
            let RelayEvent::Message(delivery) = event else {
                return;
            };
            if delivery.sender_id == own_id || delivery.label != BROADCAST_LABEL {
                return;
            }
            match serde_json::from_value::<(Value, Value)>(delivery.args) {
                Ok((packet, opts)) => sink.broadcast(&packet, &opts),
                Err(err) => warn!(
                    from = %delivery.sender_id,
                    "ignoring malformed relayed broadcast: {err}"
                ),
            }
        }));

        Self {
            node_id,
            relay,
            local,
            started,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn relay(&self) -> &Arc<R> {
        &self.relay
    }

    /// Broadcasts locally and relays the packet to every other node.
    pub fn broadcast(&self, packet: Value, opts: Value) {
        self.local.broadcast(&packet, &opts);
        self.relay.send(BROADCAST_LABEL, json!([packet, opts]));
    }

    /// Starts the pipeline and publishes the outcome to [`Self::started`].
    pub async fn start(&self) -> Result<(), Arc<RelayError>> {
        let outcome = self.relay.start().await.map_err(Arc::new);
        match &outcome {
            Ok(()) => info!(node = %self.node_id, "relay adapter started"),
            Err(err) => warn!(node = %self.node_id, "relay adapter failed to start: {err}"),
        }
        self.started.send_replace(Some(outcome.clone()));
        outcome
    }

    /// Resolves with the outcome of the current start, waiting for it if
    /// it has not finished yet.
    pub async fn started(&self) -> Result<(), Arc<RelayError>> {
        let mut outcome = self.started.subscribe();
        match outcome.wait_for(Option::is_some).await {
            Ok(state) => (*state).clone().unwrap_or(Ok(())),
            // Unreachable: the sender is owned by `self`.
            Err(_) => Ok(()),
        }
    }

    pub async fn stop(&self) {
        self.relay.stop().await;
        self.started.send_replace(None);
        info!(node = %self.node_id, "relay adapter stopped");
    }
}
