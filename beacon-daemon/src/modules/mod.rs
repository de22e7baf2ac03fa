//! Module registry.
//!
//! Every beacon pipeline is held as a [`ModuleHandle`] behind
//! [`DynPipeline`], so the orchestrator can start, stop and poll them
//! without knowing their concrete types.
//!
//! Start follows registration order; stop walks the modules that actually
//! started, newest first.

pub mod bsm;
pub mod sink;

use beacon_core::pipeline::{DynPipeline, HealthStatus};

use crate::health::ModuleHealth;

/// A registered module.
pub struct ModuleHandle {
    /// Name used in logs and health reports.
    pub name: String,
    /// Disabled modules are kept for reporting but never started.
    pub enabled: bool,
    /// The module's pipeline.
    pub pipeline: Box<dyn DynPipeline>,
}

impl ModuleHandle {
    /// Wrap a pipeline.
    pub fn new(name: impl Into<String>, enabled: bool, pipeline: Box<dyn DynPipeline>) -> Self {
        Self {
            name: name.into(),
            enabled,
            pipeline,
        }
    }

    /// Current health. A disabled module is always `Healthy`.
    pub async fn health_check(&self) -> HealthStatus {
        if self.enabled {
            self.pipeline.health_check().await
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Ordered set of modules.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<ModuleHandle>,
    /// Indices of started modules, in start order.
    running: Vec<usize>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module; it starts after every module registered before it.
    pub fn register(&mut self, handle: ModuleHandle) {
        self.modules.push(handle);
    }

    /// Start enabled modules in registration order.
    ///
    /// Stops at the first failure. Modules started before the failure stay
    /// running until [`stop_all`](Self::stop_all).
    pub async fn start_all(&mut self) -> anyhow::Result<()> {
        for (index, handle) in self.modules.iter_mut().enumerate() {
            if !handle.enabled {
                tracing::debug!(module = %handle.name, "skipping disabled module");
                continue;
            }

            tracing::info!(module = %handle.name, "starting module");
            if let Err(e) = handle.pipeline.start().await {
                return Err(anyhow::anyhow!(
                    "failed to start module '{}': {}",
                    handle.name,
                    e
                ));
            }
            self.running.push(index);
            tracing::info!(module = %handle.name, "module started");
        }
        Ok(())
    }

    /// Stop running modules, last started first.
    ///
    /// Every module gets a stop call even when an earlier one fails; the
    /// failures are reported together.
    pub async fn stop_all(&mut self) -> anyhow::Result<()> {
        let mut failures = Vec::new();

        while let Some(index) = self.running.pop() {
            let handle = &mut self.modules[index];
            tracing::info!(module = %handle.name, "stopping module");
            match handle.pipeline.stop().await {
                Ok(()) => tracing::info!(module = %handle.name, "module stopped"),
                Err(e) => {
                    tracing::error!(module = %handle.name, error = %e, "failed to stop module");
                    failures.push(format!("{}: {}", handle.name, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "errors stopping modules: {}",
                failures.join("; ")
            ))
        }
    }

    /// Health of every registered module, in registration order.
    pub async fn health_reports(&self) -> Vec<ModuleHealth> {
        let mut reports = Vec::with_capacity(self.modules.len());
        for handle in &self.modules {
            reports.push(ModuleHealth {
                name: handle.name.clone(),
                enabled: handle.enabled,
                status: handle.health_check().await,
            });
        }
        reports
    }

    /// Number of registered modules.
    pub fn count(&self) -> usize {
        self.modules.len()
    }

    /// Number of enabled modules.
    pub fn enabled_count(&self) -> usize {
        self.modules.iter().filter(|m| m.enabled).count()
    }

    /// Number of modules currently running.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use beacon_core::error::{BeaconError, PipelineError};
    use beacon_core::pipeline::Pipeline;

    use super::*;

    /// Pipeline that records lifecycle calls into a shared log.
    struct Recorder {
        name: &'static str,
        fail_start: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Pipeline for Recorder {
        async fn start(&mut self) -> Result<(), BeaconError> {
            self.log.lock().unwrap().push(format!("start {}", self.name));
            if self.fail_start {
                return Err(PipelineError::InitFailed("boom".to_owned()).into());
            }
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), BeaconError> {
            self.log.lock().unwrap().push(format!("stop {}", self.name));
            Ok(())
        }

        async fn health_check(&self) -> HealthStatus {
            HealthStatus::Degraded(format!("{} degraded", self.name))
        }
    }

    fn handle(
        name: &'static str,
        enabled: bool,
        fail_start: bool,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> ModuleHandle {
        ModuleHandle::new(
            name,
            enabled,
            Box::new(Recorder {
                name,
                fail_start,
                log: Arc::clone(log),
            }),
        )
    }

    #[tokio::test]
    async fn stops_in_reverse_start_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        registry.register(handle("a", true, false, &log));
        registry.register(handle("b", false, false, &log));
        registry.register(handle("c", true, false, &log));

        registry.start_all().await.unwrap();
        assert_eq!(registry.running_count(), 2);
        registry.stop_all().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start a", "start c", "stop c", "stop a"]
        );
    }

    #[tokio::test]
    async fn failed_start_leaves_only_started_modules_to_stop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        registry.register(handle("a", true, false, &log));
        registry.register(handle("b", true, true, &log));
        registry.register(handle("c", true, false, &log));

        let err = registry.start_all().await.unwrap_err();
        assert!(err.to_string().contains("'b'"));

        registry.stop_all().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["start a", "start b", "stop a"]);
    }

    #[tokio::test]
    async fn disabled_modules_report_healthy() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        registry.register(handle("a", true, false, &log));
        registry.register(handle("b", false, false, &log));

        let reports = registry.health_reports().await;
        assert_eq!(reports[0].status, HealthStatus::Degraded("a degraded".to_owned()));
        assert_eq!(reports[1].status, HealthStatus::Healthy);
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.enabled_count(), 1);
    }
}
