#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error type (`SinkError`)
//! - [`module`]: Sink module contract (`SinkModule`)
//! - [`producer`]: Producer contract and channel transport (`MessageProducer`, `ChannelProducer`)
//! - [`consumer`]: Consumer contract and worker pool (`MessageConsumer`, `MessageConsumerManager`)
//! - [`heartbeat`]: Heartbeat module (`Heartbeat`, `HeartbeatGenerator`, `HeartbeatConsumer`)
//! - [`sink`]: Pipeline wiring (`HeartbeatSink`)
//!
//! # Architecture
//!
//! ```text
//! HeartbeatGenerator × N ──▶ ChannelProducer ──▶ mpsc ──▶ worker × consumer_threads ──▶ HeartbeatConsumer
//!                                                  ▲
//!                                   MessageConsumerManager (register / unregister_all)
//! ```

pub mod consumer;
pub mod error;
pub mod heartbeat;
pub mod module;
pub mod producer;
pub mod sink;

// --- Public API Re-exports ---

// Contracts
pub use consumer::{MessageConsumer, MessageConsumerManager};
pub use module::SinkModule;
pub use producer::{ChannelProducer, MessageProducer};

// Heartbeat
pub use heartbeat::{
    HEARTBEAT_MODULE_ID, Heartbeat, HeartbeatConsumer, HeartbeatGenerator, HeartbeatModule,
};
pub use sink::HeartbeatSink;

// Error
pub use error::SinkError;
