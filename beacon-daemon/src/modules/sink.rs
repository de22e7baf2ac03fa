//! Heartbeat sink module initialization.

use anyhow::Result;

use beacon_core::config::BeaconConfig;
use beacon_core::event::MODULE_SINK;
use beacon_sink::HeartbeatSink;

use super::ModuleHandle;

/// Initialize the heartbeat sink module.
///
/// Returns `None` if the sink is disabled in configuration.
pub fn init(config: &BeaconConfig) -> Result<Option<ModuleHandle>> {
    if !config.sink.enabled {
        tracing::info!("heartbeat sink disabled in configuration");
        return Ok(None);
    }

    tracing::info!(
        generators = config.sink.generators,
        rate_per_generator = config.sink.rate_per_generator,
        "initializing heartbeat sink"
    );

    let sink = HeartbeatSink::new(config.sink.clone())
        .map_err(|e| anyhow::anyhow!("failed to build heartbeat sink: {}", e))?;

    Ok(Some(ModuleHandle::new(MODULE_SINK, true, Box::new(sink))))
}
