//! Demo for sbrelay
//!
//! Starts several relay nodes over one in-process broker. Every node
//! broadcasts a few packets; each node logs what its local broadcaster
//! receives, which shows relayed packets arriving in the same order
//! everywhere. Runs until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::{Value, json};
use tracing::{error, info};
use uuid::Uuid;

use sbrelay::broker::{MemoryBus, ServiceBus};
use sbrelay::config::load_config_from;
use sbrelay::relay::{BroadcastAdapter, LocalBroadcaster, Relay, RelayPipeline, pipeline};
use sbrelay::utils::logging;

#[derive(Parser)]
#[command(name = "sbrelay", about = "Ordered multicast relay demo over an in-memory broker")]
struct Cli {
    /// Number of relay nodes to run
    #[arg(long, default_value_t = 2)]
    nodes: usize,

    /// Packets each node broadcasts
    #[arg(long, default_value_t = 5)]
    messages: usize,

    /// Configuration file (defaults to config/default if present)
    #[arg(long)]
    config: Option<PathBuf>,
}

struct LoggingBroadcaster {
    node_id: String,
}

impl LocalBroadcaster for LoggingBroadcaster {
    fn broadcast(&self, packet: &Value, _opts: &Value) {
        info!(node = %self.node_id, %packet, "local broadcast");
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        // No-op when the configured subscriber is already installed.
        logging::init("info");
        error!("relay demo failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_config_from(cli.config.as_deref())?;
    logging::init(&settings.log.level);

    let bus: Arc<dyn ServiceBus> = Arc::new(MemoryBus::new(settings.receive_timeout()));

    let mut adapters: Vec<BroadcastAdapter<RelayPipeline>> = Vec::with_capacity(cli.nodes);
    for index in 0..cli.nodes {
        let mut node = settings.clone();
        node.node.id = format!("node-{index}");
        node.node.subscription = Uuid::new_v4().to_string();

        let relay = Arc::new(pipeline::build(&node, bus.clone()));
        relay.on_event(logging::event_logger(node.node.id.clone()));
        let local = Arc::new(LoggingBroadcaster {
            node_id: node.node.id.clone(),
        });
        adapters.push(BroadcastAdapter::new(node.node.id, relay, local));
    }

    let started = futures::future::join_all(adapters.iter().map(|adapter| adapter.start())).await;
    for outcome in started {
        outcome?;
    }
    info!(nodes = adapters.len(), "all relay nodes started");

    for n in 0..cli.messages {
        for adapter in &adapters {
            adapter.broadcast(json!({"from": adapter.node_id(), "n": n}), json!({"rooms": []}));
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping relay nodes");

    futures::future::join_all(adapters.iter().map(|adapter| adapter.stop())).await;
    Ok(())
}
