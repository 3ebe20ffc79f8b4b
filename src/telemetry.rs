//! Telemetry and observability setup
//!
//! Builds the tracing filter from the config document's `LOG` knob and
//! installs the subscriber. `RUST_LOG` still wins when set, so operators
//! can crank verbosity without touching the config file.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ConfigDocument;

static INIT: Once = Once::new();

/// Install the subscriber for this process. Later calls are ignored, so
/// a config reload cannot re-initialize logging mid-flight.
pub fn init(config: &ConfigDocument) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(directives(config)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

/// Filter directives derived from the config document.
///
/// `LOG: false` quiets the gateway to warnings. Either way the probe and
/// watcher dependencies are capped at warn: a flapping provider or a
/// busy editor would otherwise flood the log at their default levels.
fn directives(config: &ConfigDocument) -> String {
    let gateway_level = match config.log {
        Some(false) => "warn",
        _ => "info",
    };
    format!("polyroute={gateway_level},notify=warn,reqwest=warn,hyper=warn")
}
