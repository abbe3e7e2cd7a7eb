//! # Redfish EvtSync Agent
//!
//! Plugin runtime that keeps device event subscriptions pointed at the
//! plugin and forwards the events devices deliver onto the message bus.
//!
//! ## Architecture
//!
//! The agent runs these concurrent loops:
//! 1. **Plugin API**: subscription, startup, status and session requests from the aggregator
//! 2. **Event listener**: accepts device webhooks and queues them
//! 3. **Pipeline workers**: drain the queue and publish to the bus
//! 4. **Bus event loop**: drives the MQTT connection
//! 5. **Token sweep**: drops idle session tokens

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod config;
pub mod handlers;
pub mod inventory;
pub mod middleware;
pub mod pipeline;
pub mod runtime;
pub mod server;
pub mod tokens;

pub use bus::{BusError, MessageBus, MqttBus};
pub use config::{AgentConfig, ConfigError};
pub use inventory::DeviceInventory;
pub use pipeline::{EventPipeline, PipelineError};
pub use runtime::Agent;
pub use server::{event_router, plugin_router, AppState};
pub use tokens::TokenStore;
