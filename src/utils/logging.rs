use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use crate::relay::{EventHandler, RelayEvent};

/// Initialize tracing for the application.
///
/// `RUST_LOG` wins when set; otherwise `default_level` is used. Safe to call
/// more than once.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(normalize_level(default_level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn normalize_level(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    }
}

/// Handler that logs the operational events of a relay (`poll` and
/// `sberror`). Messages are left to the application.
pub fn event_logger(node_id: impl Into<String>) -> EventHandler {
    let node_id = node_id.into();
    std::sync::Arc::new(move |event: RelayEvent| match event {
        RelayEvent::Poll(outcome) => match (&outcome.error, &outcome.message) {
            (Some(err), _) => debug!(node = %node_id, "poll completed: {err}"),
            (None, Some(msg)) => debug!(
                node = %node_id,
                from = %msg.sender_id,
                label = %msg.label,
                seq = msg.sequence_number,
                "poll completed with message"
            ),
            (None, None) => debug!(node = %node_id, "poll completed"),
        },
        RelayEvent::SendFailed(err) => error!(node = %node_id, "service bus error: {err}"),
        _ => {}
    })
}
