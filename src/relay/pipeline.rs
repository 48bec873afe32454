use std::sync::Arc;

use tracing::info;

use crate::batcher::Batcher;
use crate::broker::ServiceBus;
use crate::config::Settings;
use crate::sequencer::Sequencer;
use crate::transport::Connector;

/// The full stack: batching over sequencing over the broker connector.
pub type RelayPipeline = Batcher<Sequencer<Connector>>;

pub fn build(settings: &Settings, bus: Arc<dyn ServiceBus>) -> RelayPipeline {
    let options = settings.connector_options();
    info!(
        node = %options.node_id,
        topic = %options.topic,
        subscription = %options.subscription,
        receives = options.num_receives,
        "building relay pipeline"
    );

    let connector = Arc::new(Connector::new(options, bus));
    let sequencer = Arc::new(Sequencer::new(connector));
    Batcher::new(sequencer, settings.flush_interval())
}
