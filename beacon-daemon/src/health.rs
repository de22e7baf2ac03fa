//! Daemon health reporting.
//!
//! Each enabled module answers `health_check()`; the daemon reports the
//! worst answer together with the reasons that produced it. Reasons are
//! prefixed with the module name (`bsmd: last reload failed: ...`).

use serde::Serialize;

use beacon_core::pipeline::HealthStatus;

/// Health report for the whole daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Worst status among enabled modules.
    pub status: HealthStatus,
    /// Seconds since the orchestrator was built.
    pub uptime_secs: u64,
    /// Per-module reports, in registration order.
    pub modules: Vec<ModuleHealth>,
}

impl DaemonHealth {
    /// Build a report, deriving the overall status from `modules`.
    pub fn from_modules(modules: Vec<ModuleHealth>, uptime_secs: u64) -> Self {
        Self {
            status: aggregate_status(&modules),
            uptime_secs,
            modules,
        }
    }
}

/// Health of one registered module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleHealth {
    /// Module name ("bsmd", "heartbeat-sink").
    pub name: String,
    /// Whether the module is enabled in configuration.
    pub enabled: bool,
    /// Last reported status.
    pub status: HealthStatus,
}

fn rank(status: &HealthStatus) -> u8 {
    match status {
        HealthStatus::Healthy => 0,
        HealthStatus::Degraded(_) => 1,
        HealthStatus::Unhealthy(_) => 2,
    }
}

/// Reduce module statuses to the worst one.
///
/// Disabled modules are skipped. The reason lists every enabled module
/// that reported the worst status, joined with `"; "`.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let enabled: Vec<&ModuleHealth> = modules.iter().filter(|m| m.enabled).collect();
    let Some(worst) = enabled.iter().map(|m| rank(&m.status)).max() else {
        return HealthStatus::Healthy;
    };

    let reasons = enabled
        .iter()
        .filter(|m| rank(&m.status) == worst)
        .filter_map(|m| match &m.status {
            HealthStatus::Healthy => None,
            HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => {
                Some(format!("{}: {}", m.name, reason))
            }
        })
        .collect::<Vec<_>>()
        .join("; ");

    match worst {
        0 => HealthStatus::Healthy,
        1 => HealthStatus::Degraded(reasons),
        _ => HealthStatus::Unhealthy(reasons),
    }
}
