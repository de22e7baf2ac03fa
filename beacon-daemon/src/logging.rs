//! Logging initialization for beacon-daemon.
//!
//! Configures `tracing-subscriber` based on the `[general]` section
//! of `BeaconConfig`. Supports JSON structured logging and
//! human-readable pretty format.

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use beacon_core::config::GeneralConfig;

/// Install the global tracing subscriber.
///
/// Call once, before the first log line. `RUST_LOG` wins over `log_level`.
///
/// * `"json"`: one JSON object per line
/// * `"pretty"`: multi-line human-readable output
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let output = match config.log_format.as_str() {
        "json" => fmt::layer().json().boxed(),
        "pretty" => fmt::layer().pretty().boxed(),
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                other
            ));
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .map_err(|e| {
            anyhow::anyhow!(
                "failed to initialize {} tracing subscriber: {}",
                config.log_format,
                e
            )
        })
}
