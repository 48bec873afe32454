//! # sbrelay
//!
//! `sbrelay` relays broadcast events between independently running server
//! instances through a topic/subscription broker that only offers
//! at-least-once, unordered, polling delivery. To the application the broker
//! then looks like one ordered, batched multicast channel.
//!
//! ## Core Modules
//!
//! - `broker`: the broker seam (`ServiceBus`) and an in-process `MemoryBus`.
//! - `transport`: the `Connector`, which provisions, polls, packs and retries.
//! - `sequencer`: restores the broker's global sequence order.
//! - `batcher`: coalesces sends on a timer and explodes received batches.
//! - `relay`: the shared `Relay` interface, events, pipeline wiring and the
//!   broadcast adapter.
//! - `config`: settings loading.
//! - `utils`: error types and logging.

pub mod batcher;
pub mod broker;
pub mod config;
pub mod relay;
pub mod sequencer;
pub mod transport;
pub mod utils;

pub use relay::{Relay, RelayEvent, RelayPipeline};
pub use utils::RelayError;
