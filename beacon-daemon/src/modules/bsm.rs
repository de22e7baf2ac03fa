//! Business service monitor module initialization.
//!
//! Wires the file-backed collaborators from `[bsm]` into a
//! [`BsmDaemon`] and wraps it in a `ModuleHandle`.
//!
//! # Wiring
//!
//! ```text
//! services_dir (YAML) ──▶ YamlServiceStore ─────────┐
//! alarms_file (JSON)  ──▶ JsonAlarmDirectory ───────┼──▶ BsmDaemon ◀──▶ EventBus
//! event_definitions   ──▶ StaticEventConfRegistry ──┘
//! ```

use std::sync::Arc;

use anyhow::Result;

use beacon_bsm::{BsmDaemon, BsmDaemonBuilder, BsmDaemonConfig, BusinessServiceStateMachine};
use beacon_core::bus::EventBus;
use beacon_core::config::BeaconConfig;
use beacon_core::event::MODULE_BSM;

use super::ModuleHandle;
use crate::store::{JsonAlarmDirectory, StaticEventConfRegistry, YamlServiceStore};

/// The bsm pipeline over file-backed collaborators.
pub type FileBsmDaemon = BsmDaemon<JsonAlarmDirectory, YamlServiceStore, StaticEventConfRegistry>;

/// Initialize the business service monitor module.
///
/// Returns `None` if the module is disabled in configuration. Otherwise returns
/// the handle together with the state machine, so callers can query severities.
pub fn init(
    config: &BeaconConfig,
    bus: Arc<dyn EventBus>,
) -> Result<Option<(ModuleHandle, Arc<BusinessServiceStateMachine>)>> {
    if !config.bsm.enabled {
        tracing::info!("business service monitor disabled in configuration");
        return Ok(None);
    }

    tracing::info!(
        services_dir = %config.bsm.services_dir,
        alarms_file = %config.bsm.alarms_file,
        "initializing business service monitor"
    );

    let daemon: FileBsmDaemon = BsmDaemonBuilder::new()
        .config(BsmDaemonConfig::from_core(&config.bsm))
        .alarm_directory(Arc::new(JsonAlarmDirectory::new(&config.bsm.alarms_file)))
        .service_store(Arc::new(YamlServiceStore::new(&config.bsm.services_dir)))
        .event_registry(Arc::new(StaticEventConfRegistry::new(
            config.bsm.event_definitions.clone(),
        )))
        .event_bus(bus)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build business service monitor: {}", e))?;

    let machine = daemon.machine();
    let handle = ModuleHandle::new(MODULE_BSM, true, Box::new(daemon));

    Ok(Some((handle, machine)))
}
