//! Device and event subscription models.
//!
//! Field names follow the aggregator's JSON encoding (`PascalCase`), and
//! byte fields (`Password`, `PostBody`) travel as base64 strings.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Event types used when the desired state does not name any.
pub const DEFAULT_EVENT_TYPES: &[&str] = &["Alert"];

/// Subscription collection on a Redfish service.
pub const SUBSCRIPTIONS_URI: &str = "/redfish/v1/EventService/Subscriptions";

/// Protocol advertised in every subscription this plugin creates.
pub const SUBSCRIPTION_PROTOCOL: &str = "Redfish";

/// Context used for subscriptions created during startup reconciliation.
pub const STARTUP_CONTEXT: &str = "Event Subscription";

/// A managed device, as sent by the aggregator on every request.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Device {
    /// Device address (`host` or `host:port`)
    pub host: String,
    /// Username for Basic authentication
    #[serde(default)]
    pub username: String,
    /// Password for Basic authentication
    #[serde(default, with = "base64_bytes")]
    pub password: Vec<u8>,
    /// Subscription URL (absolute, or a path relative to the device root)
    #[serde(default)]
    pub location: String,
    /// Raw request body forwarded from the aggregator
    #[serde(default, with = "base64_bytes")]
    pub post_body: Vec<u8>,
}

impl Device {
    /// Create a device with credentials and no location.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Return a copy of this device pointing at another location.
    #[must_use]
    pub fn at(&self, location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..self.clone()
        }
    }

    /// Password as text for the Authorization header.
    #[must_use]
    pub fn password_text(&self) -> String {
        String::from_utf8_lossy(&self.password).into_owned()
    }
}

// Credentials never reach the logs.
impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("location", &self.location)
            .field("post_body_len", &self.post_body.len())
            .finish()
    }
}

/// Desired subscription state, as posted to a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventSubscriptionRequest {
    /// Callback URL events are delivered to
    #[serde(default)]
    pub destination: String,
    /// Event types to subscribe to
    #[serde(default)]
    pub event_types: Vec<String>,
    /// Message registry identifiers to filter on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_ids: Vec<String>,
    /// Resource types to filter on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_types: Vec<String>,
    /// Headers the device should attach to every delivery
    #[serde(default, rename = "HttpHeaders", skip_serializing_if = "Vec::is_empty")]
    pub http_headers: Vec<serde_json::Value>,
    /// Opaque client context
    #[serde(default)]
    pub context: String,
    /// Delivery protocol
    #[serde(default)]
    pub protocol: String,
}

/// A subscription as reported by a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Resource path of the subscription
    #[serde(rename = "@odata.id", default)]
    pub odata_id: String,
    /// Callback URL registered on the device
    #[serde(rename = "Destination", default)]
    pub destination: Option<String>,
    /// Event types the device will deliver; `null` or a non-list reads as empty
    #[serde(rename = "EventTypes", default, deserialize_with = "lenient_strings")]
    pub event_types: Vec<String>,
}

/// Read a string list, tolerating devices that send `null` or a bare value.
fn lenient_strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(text) => Some(text),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// A reference to another resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ODataLink {
    /// Resource path
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
}

/// The subscription collection of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionCollection {
    /// Collection members
    #[serde(rename = "Members", default)]
    pub members: Vec<ODataLink>,
}

/// Per-device subscription state relative to the desired event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// The device has no subscription at the known location
    NoSubscription,
    /// The device subscription delivers exactly the desired event types
    SubscribedMatching,
    /// The device subscription delivers a different list of event types
    SubscribedMismatched,
}

impl SubscriptionState {
    /// Classify an observed subscription against the desired event types.
    ///
    /// The comparison is order sensitive: `["A", "B"]` and `["B", "A"]`
    /// are different subscriptions.
    #[must_use]
    pub fn classify(observed: Option<&SubscriptionRecord>, desired: &[String]) -> Self {
        match observed {
            None => Self::NoSubscription,
            Some(record) if record.event_types == desired => Self::SubscribedMatching,
            Some(_) => Self::SubscribedMismatched,
        }
    }
}

/// Event subscription details the aggregator holds for a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventSubscriptionInfo {
    /// Desired event types
    #[serde(default)]
    pub event_types: Vec<String>,
    /// Location of the existing device subscription
    #[serde(default)]
    pub location: String,
}

/// A device entry of a startup request.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceData {
    /// Username for Basic authentication
    #[serde(default)]
    pub user_name: String,
    /// Password for Basic authentication
    #[serde(default, with = "base64_bytes")]
    pub password: Vec<u8>,
    /// Device address
    pub address: String,
    /// Inventory operation: `add` or `del`
    #[serde(default)]
    pub operation: String,
    /// Subscription details, if the aggregator has any
    #[serde(default)]
    pub event_subscription_info: Option<EventSubscriptionInfo>,
}

impl DeviceData {
    /// Build the device handle used for southbound calls.
    #[must_use]
    pub fn to_device(&self) -> Device {
        Device {
            host: self.address.clone(),
            username: self.user_name.clone(),
            password: self.password.clone(),
            location: self
                .event_subscription_info
                .as_ref()
                .map(|info| info.location.clone())
                .unwrap_or_default(),
            post_body: Vec::new(),
        }
    }

    /// Desired event types, falling back to [`DEFAULT_EVENT_TYPES`].
    #[must_use]
    pub fn desired_event_types(&self) -> Vec<String> {
        match &self.event_subscription_info {
            Some(info) if !info.event_types.is_empty() => info.event_types.clone(),
            _ => DEFAULT_EVENT_TYPES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl fmt::Debug for DeviceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceData")
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .field("address", &self.address)
            .field("operation", &self.operation)
            .field("event_subscription_info", &self.event_subscription_info)
            .finish()
    }
}

/// Batch reconciliation trigger sent by the aggregator at plugin startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartupRequest {
    /// `full` or `delta`
    #[serde(default)]
    pub request_type: String,
    /// Whether device subscriptions should be reconciled
    #[serde(default)]
    pub resync_evt_subscription: bool,
    /// Devices keyed by aggregator UUID
    #[serde(default)]
    pub devices: HashMap<String, DeviceData>,
}

impl StartupRequest {
    /// Subscriptions are only reconciled on a full resync.
    #[must_use]
    pub fn wants_resync(&self) -> bool {
        self.resync_evt_subscription && self.request_type == "full"
    }
}

/// Serde adapter for byte fields encoded as base64 strings.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(Vec::new()),
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map_err(serde::de::Error::custom),
        }
    }
}
