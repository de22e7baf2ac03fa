//! Module orchestration: bus wiring and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `beacon-daemon`.
//! It validates configuration, creates the in-process event bus, builds
//! enabled modules, manages startup/shutdown ordering, and runs the main
//! signal loop.
//!
//! # Startup Order
//!
//! 1. Business service monitor (initial reload, then event and poll paths)
//! 2. Heartbeat sink
//!
//! # Shutdown Order (reverse of startup)
//!
//! 1. Heartbeat sink (generators joined, consumers unregistered)
//! 2. Business service monitor (in-flight reconciliation finishes first)
//!
//! # Signals
//!
//! - `SIGHUP`: publish a reload request for `bsmd` on the event bus
//! - `SIGTERM` / `SIGINT`: graceful shutdown

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use beacon_bsm::BusinessServiceStateMachine;
use beacon_core::bus::{EventBus, InMemoryEventBus};
use beacon_core::config::BeaconConfig;
use beacon_core::event::{
    BusEvent, DAEMON_NAME_BSM, MODULE_BSM, MODULE_DAEMON, PARM_BUSINESS_SERVICE_ID,
    PARM_BUSINESS_SERVICE_NAME, PARM_DAEMON_NAME, PARM_NEW_SEVERITY_LABEL, PARM_PREV_SEVERITY_LABEL, PARM_REASON,
    UEI_BSM_STATUS_CHANGED, UEI_RELOAD_DAEMON_CONFIG, UEI_RELOAD_DAEMON_CONFIG_FAILED,
    UEI_RELOAD_DAEMON_CONFIG_SUCCESSFUL,
};
use beacon_core::metrics as m;

use crate::health::DaemonHealth;
use crate::metrics_server;
use crate::modules::{self, ModuleRegistry};

/// Capacity of the daemon's own bus subscription.
const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

/// Seconds between uptime gauge updates.
const UPTIME_UPDATE_INTERVAL_SECS: u64 = 10;

/// Signals the main loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DaemonSignal {
    /// SIGHUP
    Reload,
    /// SIGTERM or SIGINT
    Shutdown(&'static str),
}

/// Unix signal handlers installed for the lifetime of [`Orchestrator::run`].
struct SignalListener {
    sigterm: Signal,
    sigint: Signal,
    sighup: Signal,
}

impl SignalListener {
    fn install() -> Result<Self> {
        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| anyhow::anyhow!("failed to install {} handler: {}", name, e))
        };
        Ok(Self {
            sigterm: install(SignalKind::terminate(), "SIGTERM")?,
            sigint: install(SignalKind::interrupt(), "SIGINT")?,
            sighup: install(SignalKind::hangup(), "SIGHUP")?,
        })
    }

    async fn recv(&mut self) -> DaemonSignal {
        tokio::select! {
            _ = self.sigterm.recv() => DaemonSignal::Shutdown("SIGTERM"),
            _ = self.sigint.recv() => DaemonSignal::Shutdown("SIGINT"),
            _ = self.sighup.recv() => DaemonSignal::Reload,
        }
    }
}

/// The main daemon orchestrator.
///
/// Manages the complete lifecycle of all beacon modules:
/// bus wiring, ordered startup, health reporting, reload requests,
/// and graceful shutdown.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: BeaconConfig,
    /// Registry of all modules (ordered for start/stop).
    modules: ModuleRegistry,
    /// In-process event bus shared by all modules.
    bus: Arc<InMemoryEventBus>,
    /// State machine of the business service monitor, when enabled.
    machine: Option<Arc<BusinessServiceStateMachine>>,
    /// Shutdown broadcast sender (signals all background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Background tasks spawned by `start`.
    tasks: Vec<JoinHandle<()>>,
    /// PID file written by `start`, removed by `shutdown`.
    pid_file: Option<PathBuf>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// Loads `beacon.toml`, applies environment variable overrides,
    /// validates, then initializes enabled modules.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = BeaconConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The metrics recorder cannot be installed
    /// - Any enabled module fails to initialize
    pub async fn build_from_config(config: BeaconConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install metrics recorder before module initialization
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let bus = Arc::new(InMemoryEventBus::new());
        let (shutdown_tx, _) = broadcast::channel(16);
        let mut registry = ModuleRegistry::new();
        let mut machine = None;

        let shared_bus: Arc<dyn EventBus> = bus.clone();
        if let Some((handle, state_machine)) = modules::bsm::init(&config, shared_bus)? {
            registry.register(handle);
            machine = Some(state_machine);
        }

        if let Some(handle) = modules::sink::init(&config)? {
            registry.register(handle);
        }

        tracing::info!(
            total_modules = registry.count(),
            enabled_modules = registry.enabled_count(),
            "orchestrator initialized"
        );

        if config.metrics.enabled {
            record_daemon_metrics();
        }

        Ok(Self {
            config,
            modules: registry,
            bus,
            machine,
            shutdown_tx,
            tasks: Vec::new(),
            pid_file: None,
            start_time: Instant::now(),
        })
    }

    /// Start all enabled modules and enter the main signal loop.
    ///
    /// Blocks until `SIGTERM` or `SIGINT` is received. `SIGHUP` requests a
    /// reload of the business service graph and keeps the daemon running.
    pub async fn run(&mut self) -> Result<()> {
        let mut signals = SignalListener::install()?;
        self.start().await?;

        tracing::info!("entering main event loop");
        loop {
            match signals.recv().await {
                DaemonSignal::Reload => {
                    tracing::info!(signal = "SIGHUP", "reload requested");
                    self.request_reload();
                }
                DaemonSignal::Shutdown(name) => {
                    tracing::info!(signal = name, "shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown().await
    }

    /// Write the PID file, start background tasks, then start all modules.
    ///
    /// On module startup failure, already-started modules are stopped and
    /// the PID file is removed before the error is returned.
    pub async fn start(&mut self) -> Result<()> {
        if !self.config.general.pid_file.is_empty() {
            let path = PathBuf::from(&self.config.general.pid_file);
            write_pid_file(&path)?;
            self.pid_file = Some(path);
        }

        // Subscribe before modules start so the initial reload is logged too
        let notifications = self.bus.subscribe(
            &[
                UEI_BSM_STATUS_CHANGED,
                UEI_RELOAD_DAEMON_CONFIG_SUCCESSFUL,
                UEI_RELOAD_DAEMON_CONFIG_FAILED,
            ],
            NOTIFICATION_CHANNEL_CAPACITY,
        );
        self.tasks.push(spawn_notification_logger(
            notifications,
            self.shutdown_tx.subscribe(),
        ));

        if self.config.metrics.enabled {
            self.tasks.push(spawn_uptime_updater(
                self.start_time,
                self.shutdown_tx.subscribe(),
            ));
        }

        tracing::info!("starting all modules");
        if let Err(e) = self.modules.start_all().await {
            tracing::warn!("startup failed, rolling back already-started modules");
            if let Err(stop_err) = self.modules.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            self.stop_background_tasks().await;
            self.remove_pid_file();
            return Err(e);
        }

        tracing::info!("beacon-daemon running, modules active");
        Ok(())
    }

    /// Publish a reload request for the business service monitor.
    pub fn request_reload(&self) {
        self.bus.publish(
            BusEvent::new(UEI_RELOAD_DAEMON_CONFIG, MODULE_DAEMON)
                .with_param(PARM_DAEMON_NAME, DAEMON_NAME_BSM),
        );
    }

    /// Stop background tasks and all modules, then remove the PID file.
    ///
    /// Modules stop in reverse registration order.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all modules");
        let result = self.modules.stop_all().await;

        self.stop_background_tasks().await;
        self.remove_pid_file();

        result
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let modules = self.modules.health_reports().await;

        let uptime_secs = self.start_time.elapsed().as_secs();
        if self.config.metrics.enabled {
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth::from_modules(modules, uptime_secs)
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &BeaconConfig {
        &self.config
    }

    /// The in-process event bus.
    pub fn bus(&self) -> Arc<InMemoryEventBus> {
        Arc::clone(&self.bus)
    }

    /// The business service state machine, if the monitor is enabled.
    pub fn state_machine(&self) -> Option<Arc<BusinessServiceStateMachine>> {
        self.machine.clone()
    }

    async fn stop_background_tasks(&mut self) {
        tracing::debug!("broadcasting shutdown signal to all tasks");
        let _ = self.shutdown_tx.send(());
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }

    fn remove_pid_file(&mut self) {
        if let Some(path) = self.pid_file.take() {
            remove_pid_file(&path);
        }
    }
}

/// Write the current process PID to a file.
///
/// Used to prevent duplicate daemon instances.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create file (prevents TOCTOU races)
/// - Verifies the created file is a regular file
/// - Creates parent directory with restrictive permissions (0o700)
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .mode(0o700)
                .recursive(true)
                .create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Spawn a background task that logs status changes and reload outcomes.
fn spawn_notification_logger(
    mut events: mpsc::Receiver<BusEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => log_notification(&event),
                        None => {
                            tracing::debug!("notification channel closed, exiting logger");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("notification logger shutting down");
                    break;
                }
            }
        }
    })
}

fn log_notification(event: &BusEvent) {
    let param = |name: &'static str| event.param(name).unwrap_or_default();
    match event.uei.as_str() {
        UEI_BSM_STATUS_CHANGED => tracing::info!(
            service_id = param(PARM_BUSINESS_SERVICE_ID),
            service_name = param(PARM_BUSINESS_SERVICE_NAME),
            previous = param(PARM_PREV_SEVERITY_LABEL),
            current = param(PARM_NEW_SEVERITY_LABEL),
            "business service status changed"
        ),
        UEI_RELOAD_DAEMON_CONFIG_SUCCESSFUL => tracing::info!(
            daemon = param(PARM_DAEMON_NAME),
            "daemon reload succeeded"
        ),
        UEI_RELOAD_DAEMON_CONFIG_FAILED => tracing::warn!(
            daemon = param(PARM_DAEMON_NAME),
            reason = param(PARM_REASON),
            "daemon reload failed"
        ),
        other => tracing::debug!(uei = other, "unexpected notification"),
    }
}

/// Record daemon-level metrics (build info).
fn record_daemon_metrics() {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that periodically updates the uptime metric.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(UPTIME_UPDATE_INTERVAL_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
