//! Messages published to the event bus.

use evtsync_core::IngestionEvent;
use serde::{Deserialize, Serialize};

/// An ingested event as it travels on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Originator address
    pub ip: String,
    /// Event body (JSON, already translated northbound)
    pub request: Vec<u8>,
    /// Event classification
    pub event_type: String,
    /// Publishing plugin identifier
    pub plugin_id: String,
}

impl EventEnvelope {
    /// Wrap an ingested event.
    #[must_use]
    pub fn new(event: IngestionEvent, plugin_id: impl Into<String>) -> Self {
        Self {
            ip: event.ip,
            request: event.request,
            event_type: event.event_type,
            plugin_id: plugin_id.into(),
        }
    }

    /// Serialize to CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, MessageError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| MessageError::Serialize(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize from CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, MessageError> {
        ciborium::from_reader(bytes).map_err(|e| MessageError::Deserialize(e.to_string()))
    }
}

/// Body of the notification a plugin emits once it is serving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PluginStatusEvent {
    /// Human readable event name
    pub name: String,
    /// Event kind
    #[serde(rename = "Type")]
    pub kind: String,
    /// Time the event was raised
    pub timestamp: String,
    /// Address of the plugin
    #[serde(rename = "OriginatorID")]
    pub originator_id: String,
}

impl PluginStatusEvent {
    /// A `PluginStarted` event for the given originator.
    #[must_use]
    pub fn started(originator_id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            name: "Plugin startup event".to_string(),
            kind: "PluginStarted".to_string(),
            timestamp: timestamp.into(),
            originator_id: originator_id.into(),
        }
    }

    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::Serialize(e.to_string()))
    }
}

/// Errors for message serialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessageError {
    /// Serialization failed
    #[error("serialize error: {0}")]
    Serialize(String),
    /// Deserialization failed
    #[error("deserialize error: {0}")]
    Deserialize(String),
}
