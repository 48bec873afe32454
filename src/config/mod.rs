mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BatcherSettings, BusSettings, ConnectorSettings, LogSettings, NodeSettings, Settings,
};

/// Prefix of environment overrides, e.g. `SBRELAY_CONNECTOR__NUM_RECEIVES`.
pub const ENV_PREFIX: &str = "SBRELAY";

/// Loads settings from the optional `config/default` file and the
/// environment, merged over the defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(None)
}

/// Like [`load_config`], but reads the given file instead of
/// `config/default`. An explicit file must exist.
pub fn load_config_from(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("config/default").required(false),
    };

    let builder = Config::builder().add_source(file).add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__"),
    );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let default = Settings::default();

    let node = partial.node.unwrap_or_default();
    let connector = partial.connector.unwrap_or_default();
    let batcher = partial.batcher.unwrap_or_default();
    let bus = partial.bus.unwrap_or_default();
    let log = partial.log.unwrap_or_default();

    Ok(Settings {
        node: NodeSettings {
            id: node.id.unwrap_or(default.node.id),
            topic: node.topic.unwrap_or(default.node.topic),
            subscription: node.subscription.unwrap_or(default.node.subscription),
        },
        connector: ConnectorSettings {
            num_receives: connector
                .num_receives
                .unwrap_or(default.connector.num_receives),
            num_retries: connector
                .num_retries
                .unwrap_or(default.connector.num_retries),
            retry_interval_ms: connector
                .retry_interval_ms
                .unwrap_or(default.connector.retry_interval_ms),
            auto_delete_on_idle_secs: connector
                .auto_delete_on_idle_secs
                .unwrap_or(default.connector.auto_delete_on_idle_secs),
        },
        batcher: BatcherSettings {
            flush_interval_ms: batcher
                .flush_interval_ms
                .unwrap_or(default.batcher.flush_interval_ms),
        },
        bus: BusSettings {
            receive_timeout_ms: bus
                .receive_timeout_ms
                .unwrap_or(default.bus.receive_timeout_ms),
        },
        log: LogSettings {
            level: log.level.unwrap_or(default.log.level),
        },
    })
}
