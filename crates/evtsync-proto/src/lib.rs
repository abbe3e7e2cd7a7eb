//! # Redfish EvtSync Protocol
//!
//! Wire format of events published to the cluster message bus.
//!
//! ## Messages
//!
//! - `EventEnvelope`: CBOR envelope carrying one ingested event
//! - `PluginStatusEvent`: JSON body of the plugin startup notification
//!
//! ## Topics
//!
//! Topic scheme: `evtsync/v1/{queue}/{event_type}`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod messages;
pub mod topics;

pub use messages::{EventEnvelope, MessageError, PluginStatusEvent};
pub use topics::TopicScheme;
