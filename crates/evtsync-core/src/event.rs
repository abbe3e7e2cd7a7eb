//! Events handed from ingress to the message bus.

use serde::{Deserialize, Serialize};

/// Event type of device webhook deliveries.
pub const REDFISH_EVENT: &str = "RedfishEvent";

/// Event type of the plugin startup notification.
pub const PLUGIN_STARTUP_EVENT: &str = "PluginStartUp";

/// One inbound event, consumed exactly once by a pipeline worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionEvent {
    /// Originator address
    pub ip: String,
    /// Translated request body
    pub request: Vec<u8>,
    /// Event classification
    pub event_type: String,
}

impl IngestionEvent {
    /// An event delivered by a device webhook.
    #[must_use]
    pub fn redfish(ip: impl Into<String>, request: Vec<u8>) -> Self {
        Self {
            ip: ip.into(),
            request,
            event_type: REDFISH_EVENT.to_string(),
        }
    }

    /// The notification the plugin emits once it is up.
    #[must_use]
    pub fn plugin_startup(ip: impl Into<String>, request: Vec<u8>) -> Self {
        Self {
            ip: ip.into(),
            request,
            event_type: PLUGIN_STARTUP_EVENT.to_string(),
        }
    }
}
