#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`BsmError`, `GraphError`)
//! - [`config`]: Daemon configuration (`BsmDaemonConfig`, poll interval resolution)
//! - [`graph`]: Validated service graph arena (`ServiceGraph`, `ServiceNode`, `ChildRef`)
//! - [`reduce`]: Reduce strategies (`reduce`)
//! - [`aggregator`]: Alarm-driven state machine (`BusinessServiceStateMachine`)
//! - [`notifier`]: Status change publication (`BusNotifier`)
//! - [`contract`]: Reduction key contract check (`verify_reduction_keys`)
//! - [`daemon`]: Ingestion pipeline (`BsmDaemon`, `BsmDaemonBuilder`)
//!
//! # Architecture
//!
//! ```text
//! alarm lifecycle ──┐
//! reload request ───┼──▶ BsmDaemon ──▶ BusinessServiceStateMachine ──▶ BusNotifier ──▶ EventBus
//! poll interval ────┘
//! ```

pub mod aggregator;
pub mod config;
pub mod contract;
pub mod daemon;
pub mod error;
pub mod graph;
pub mod notifier;
pub mod reduce;

// --- Public API Re-exports ---

// Daemon (ingestion pipeline)
pub use daemon::{BsmDaemon, BsmDaemonBuilder, ReconcileReport, ReloadOutcome};

// State machine
pub use aggregator::{
    AlarmSnapshot, BusinessServiceStateMachine, EffectiveStatus, HandlerId, StatusChange,
    StatusChangeHandler,
};

// Graph
pub use graph::{ChildRef, ServiceGraph, ServiceNode};

// Configuration
pub use config::BsmDaemonConfig;

// Error
pub use error::{BsmError, GraphError};

// Notification and contract
pub use contract::verify_reduction_keys;
pub use notifier::BusNotifier;
