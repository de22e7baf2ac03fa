//! File-backed collaborators for the business service monitor.
//!
//! - [`YamlServiceStore`]: every `*.yml` / `*.yaml` file in a directory holds a
//!   list of business service definitions
//! - [`JsonAlarmDirectory`]: a JSON array of alarm rows, re-read on every call
//! - [`StaticEventConfRegistry`]: event definitions taken from `[bsm]` in `beacon.toml`
//!
//! Each call reads the files from scratch, so an edit followed by a reload
//! request (SIGHUP) is picked up without restarting the daemon.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use beacon_core::error::{BeaconError, StoreError};
use beacon_core::store::{AlarmDirectory, BusinessServiceStore, EventConfRegistry};
use beacon_core::types::{AlarmId, AlarmRow, EventDefinition, ServiceDefinition};

/// Business service definitions stored as YAML files in one directory.
///
/// Files are read in file name order; definitions keep their order inside a file.
///
/// ```yaml
/// - id: 1
///   name: checkout
///   reduce: { type: highest_severity }
///   children:
///     - kind: node
///       target: 2
///     - kind: alarm
///       reduction_key: "uei.opennms.org/nodes/nodeDown::12"
///       map: { type: increase }
/// ```
#[derive(Debug, Clone)]
pub struct YamlServiceStore {
    dir: PathBuf,
}

impl YamlServiceStore {
    /// Create a store reading from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the definitions are read from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn definition_files(&self) -> Result<Vec<PathBuf>, BeaconError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            StoreError::Connection(format!(
                "cannot open services directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if is_yaml && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl BusinessServiceStore for YamlServiceStore {
    async fn find_all(&self) -> Result<Vec<ServiceDefinition>, BeaconError> {
        let mut definitions = Vec::new();

        for path in self.definition_files().await? {
            let content = tokio::fs::read_to_string(&path).await?;
            if content.trim().is_empty() {
                continue;
            }
            let parsed: Vec<ServiceDefinition> =
                serde_yaml::from_str(&content).map_err(|e| StoreError::Corrupt {
                    id: path.display().to_string(),
                    reason: e.to_string(),
                })?;

            tracing::debug!(path = %path.display(), services = parsed.len(), "service definitions read");
            definitions.extend(parsed);
        }

        Ok(definitions)
    }
}

/// Alarm rows stored as a JSON array in one file.
///
/// A missing file is an empty directory.
///
/// ```json
/// [{ "id": 7, "reduction_key": "uei.opennms.org/nodes/nodeDown::12", "severity": "MAJOR" }]
/// ```
#[derive(Debug, Clone)]
pub struct JsonAlarmDirectory {
    path: PathBuf,
}

impl JsonAlarmDirectory {
    /// Create a directory reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File the alarms are read from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AlarmDirectory for JsonAlarmDirectory {
    async fn find_all(&self) -> Result<Vec<AlarmRow>, BeaconError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "alarm file not found, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|e| {
            StoreError::Corrupt {
                id: self.path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    async fn get(&self, id: AlarmId) -> Result<Option<AlarmRow>, BeaconError> {
        Ok(self.find_all().await?.into_iter().find(|row| row.id == id))
    }
}

/// Event definitions fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticEventConfRegistry {
    definitions: Vec<EventDefinition>,
}

impl StaticEventConfRegistry {
    /// Create a registry from a list of definitions.
    pub fn new(definitions: Vec<EventDefinition>) -> Self {
        Self { definitions }
    }
}

impl EventConfRegistry for StaticEventConfRegistry {
    fn get_events_for_uei(&self, uei: &str) -> Vec<EventDefinition> {
        self.definitions
            .iter()
            .filter(|definition| definition.uei == uei)
            .cloned()
            .collect()
    }
}
