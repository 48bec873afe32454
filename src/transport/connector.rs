//! Broker connector
//!
//! Lowest layer of the pipeline. Responsibilities:
//! - create the topic and the subscription, accepting "already exists"
//! - run `num_receives` poll loops until a stop is requested
//! - turn every received record into a `message` or a `badmessage` event,
//!   keeping its broker sequence number either way
//! - pack outgoing sends and push them through the retry policy
//!
//! Poll loops and send tasks never call handlers themselves. They queue
//! events on a channel drained by one dispatcher task, which is the only
//! place handlers of this pipeline are invoked from.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerError, Envelope, ServiceBus, SubscriptionOptions, TransportMessage};
use crate::relay::{BadDelivery, Delivery, EventHandler, Listeners, PollOutcome, Relay, RelayEvent};
use crate::transport::retry::RetryPolicy;
use crate::utils::RelayError;

#[derive(Debug, Clone)]
pub struct ConnectorOptions {
    pub node_id: String,
    pub topic: String,
    pub subscription: String,
    pub num_receives: usize,
    pub retry: RetryPolicy,
    pub subscription_options: SubscriptionOptions,
}

impl ConnectorOptions {
    pub const DEFAULT_SIMULTANEOUS_RECEIVES: usize = 4;

    pub fn new(node_id: &str, topic: &str, subscription: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            topic: topic.to_string(),
            subscription: subscription.to_string(),
            num_receives: Self::DEFAULT_SIMULTANEOUS_RECEIVES,
            retry: RetryPolicy::default(),
            subscription_options: SubscriptionOptions::default(),
        }
    }
}

/// Stop flag and running-loop counter shared with the poll loops.
///
/// `epoch` advances on every stop, so a start that was provisioning while a
/// stop came in can tell it must not launch its loops.
#[derive(Debug)]
struct PollControl {
    stopping: AtomicBool,
    epoch: AtomicU64,
    running: watch::Sender<usize>,
}

impl PollControl {
    /// Adds `count` running loops unless a stop arrived after `epoch` was read.
    fn launch(&self, epoch: u64, count: usize) -> bool {
        self.running.send_if_modified(|running| {
            self.stopping.store(false, Ordering::SeqCst);
            if self.epoch.load(Ordering::SeqCst) != epoch {
                self.stopping.store(true, Ordering::SeqCst);
                return false;
            }
            *running += count;
            true
        })
    }

    async fn wait_idle(&self) {
        let mut running = self.running.subscribe();
        // The sender lives in `self`, so this only returns once the count hits zero.
        let _ = running.wait_for(|count| *count == 0).await;
    }
}

pub struct Connector {
    options: ConnectorOptions,
    bus: Arc<dyn ServiceBus>,
    listeners: Arc<Listeners>,
    control: Arc<PollControl>,
    events: mpsc::UnboundedSender<RelayEvent>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<RelayEvent>>>,
}

impl Connector {
    pub fn new(options: ConnectorOptions, bus: Arc<dyn ServiceBus>) -> Self {
        let (events, inbox) = mpsc::unbounded_channel();
        let (running, _) = watch::channel(0);
        Self {
            options,
            bus,
            listeners: Arc::new(Listeners::default()),
            control: Arc::new(PollControl {
                stopping: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                running,
            }),
            events,
            inbox: Mutex::new(Some(inbox)),
        }
    }

    pub fn options(&self) -> &ConnectorOptions {
        &self.options
    }

    /// Number of poll loops that have not yet returned.
    pub fn running_receives(&self) -> usize {
        *self.control.running.borrow()
    }

    /// Spawns the dispatcher on first use. It ends on its own once the
    /// connector and every loop and send task holding a sender are gone.
    fn ensure_dispatcher(&self) {
        let inbox = self
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut inbox) = inbox {
            let listeners = self.listeners.clone();
            tokio::spawn(async move {
                while let Some(event) = inbox.recv().await {
                    listeners.emit(event);
                }
            });
        }
    }

    async fn provision(&self) -> Result<(), RelayError> {
        let topic = &self.options.topic;
        let subscription = &self.options.subscription;

        tolerate_existing(self.bus.create_topic(topic).await)
            .map_err(|source| provisioning_failed(format!("topic '{topic}'"), source))?;
        info!(topic = %topic, "topic ready");

        tolerate_existing(
            self.bus
                .create_subscription(topic, subscription, &self.options.subscription_options)
                .await,
        )
        .map_err(|source| {
            provisioning_failed(format!("subscription '{topic}|{subscription}'"), source)
        })?;
        info!(topic = %topic, subscription = %subscription, "subscription ready");
        Ok(())
    }

    fn spawn_poll_loop(&self, index: usize) {
        let bus = self.bus.clone();
        let topic = self.options.topic.clone();
        let subscription = self.options.subscription.clone();
        let control = self.control.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            info!(poll = index, "service bus poll started");
            loop {
                let received = bus.receive_subscription_message(&topic, &subscription).await;
                handle_receive(received, &events);

                if control.stopping.load(Ordering::SeqCst) {
                    break;
                }
            }
            control.running.send_modify(|count| *count = count.saturating_sub(1));
            info!(
                poll = index,
                remaining = *control.running.borrow(),
                "service bus poll stopped"
            );
        });
    }
}

fn tolerate_existing(result: Result<(), BrokerError>) -> Result<(), BrokerError> {
    match result {
        Err(BrokerError::AlreadyExists(entity)) => {
            debug!(entity = %entity, "already exists, using it");
            Ok(())
        }
        other => other,
    }
}

fn provisioning_failed(entity: String, source: BrokerError) -> RelayError {
    error!(entity = %entity, "provisioning failed: {source}");
    RelayError::Provisioning { entity, source }
}

fn handle_receive(
    received: Result<TransportMessage, BrokerError>,
    events: &mpsc::UnboundedSender<RelayEvent>,
) {
    match received {
        Ok(message) => {
            let event = match unpack(&message) {
                Ok(delivery) => RelayEvent::Message(delivery),
                Err(bad) => RelayEvent::BadMessage(bad),
            };
            let _ = events.send(RelayEvent::Poll(PollOutcome {
                error: None,
                message: Some(message),
            }));
            let _ = events.send(event);
        }
        Err(err) => {
            match &err {
                BrokerError::NoMessages => debug!("service bus poll: no message"),
                other => warn!("service bus receive failed: {other}"),
            }
            let _ = events.send(RelayEvent::Poll(PollOutcome {
                error: Some(err),
                message: None,
            }));
        }
    }
}

/// Decodes a received record. A payload that is not valid JSON yields a
/// [`BadDelivery`] that keeps the record's sequence number.
pub fn unpack(message: &TransportMessage) -> Result<Delivery, BadDelivery> {
    match serde_json::from_slice::<Value>(&message.body) {
        Ok(args) => {
            info!(from = %message.sender_id, label = %message.label, "service bus received message");
            debug!(message_id = %message.message_id, "service bus received message");
            Ok(Delivery {
                sender_id: message.sender_id.clone(),
                label: message.label.clone(),
                args,
                sequence_number: message.sequence_number,
            })
        }
        Err(err) => {
            warn!(
                correlation_id = %message.sender_id,
                label = %message.label,
                sequence_number = message.sequence_number,
                size = message.size(),
                enqueued_at = %message.enqueued_at,
                message_id = %message.message_id,
                "service bus bad message received: {err}"
            );
            Err(BadDelivery {
                sender_id: message.sender_id.clone(),
                label: message.label.clone(),
                sequence_number: message.sequence_number,
            })
        }
    }
}

#[async_trait]
impl Relay for Connector {
    async fn start(&self) -> Result<(), RelayError> {
        self.ensure_dispatcher();

        if self.control.stopping.load(Ordering::SeqCst) {
            // A stop is still draining; let it finish before launching new loops.
            self.control.wait_idle().await;
        } else if self.running_receives() > 0 {
            debug!("connector already polling");
            return Ok(());
        }

        let epoch = self.control.epoch.load(Ordering::SeqCst);
        self.provision().await?;

        let count = self.options.num_receives.max(1);
        if !self.control.launch(epoch, count) {
            info!(
                subscription = %self.options.subscription,
                "stopped while starting, no polls launched"
            );
            return Ok(());
        }
        for index in 0..count {
            self.spawn_poll_loop(index);
        }
        Ok(())
    }

    async fn stop(&self) {
        self.control.epoch.fetch_add(1, Ordering::SeqCst);
        self.control.stopping.store(true, Ordering::SeqCst);
        self.control.wait_idle().await;
        info!(subscription = %self.options.subscription, "all service bus polls stopped");
    }

    fn send(&self, label: &str, args: Value) {
        self.ensure_dispatcher();

        let envelope = match Envelope::pack(&self.options.node_id, label, &args) {
            Ok(envelope) => envelope,
            Err(source) => {
                let err = RelayError::Serialize {
                    label: label.to_string(),
                    source,
                };
                error!("{err}");
                let _ = self.events.send(RelayEvent::SendFailed(Arc::new(err)));
                return;
            }
        };

        let bus = self.bus.clone();
        let topic = self.options.topic.clone();
        let retry = self.options.retry;
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = retry
                .run(|| {
                    let bus = bus.clone();
                    let envelope = envelope.clone();
                    let topic = topic.clone();
                    async move { bus.send_topic_message(&topic, envelope).await }
                })
                .await;

            if let Err(source) = result {
                error!(topic = %topic, "service bus send to topic failed: {source}");
                let err = RelayError::Transport {
                    topic,
                    attempts: retry.attempts,
                    source,
                };
                let _ = events.send(RelayEvent::SendFailed(Arc::new(err)));
            }
        });
    }

    fn on_event(&self, handler: EventHandler) {
        self.listeners.add(handler);
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("options", &self.options)
            .field("running_receives", &self.running_receives())
            .finish()
    }
}
