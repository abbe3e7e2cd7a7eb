//! MQTT topic scheme for event publication.
//!
//! Topic structure: `evtsync/v1/{queue}/{event_type}`
//!
//! This allows:
//! - One topic tree per configured bus queue
//! - Consumers filtering on event type

use serde::{Deserialize, Serialize};

/// Protocol version for topic scheme.
pub const PROTOCOL_VERSION: &str = "v1";

/// Topic scheme configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicScheme {
    /// Topic prefix (default: "evtsync")
    pub prefix: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            prefix: "evtsync".to_string(),
        }
    }
}

impl TopicScheme {
    /// Create a topic scheme with a custom prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Topic for one event type on a queue.
    #[must_use]
    pub fn event(&self, queue: &str, event_type: &str) -> String {
        format!("{}/{}/{queue}/{event_type}", self.prefix, PROTOCOL_VERSION)
    }

    /// Wildcard subscription for every event on a queue.
    #[must_use]
    pub fn queue_wildcard(&self, queue: &str) -> String {
        format!("{}/{}/{queue}/#", self.prefix, PROTOCOL_VERSION)
    }

    /// Parse a topic to extract components.
    ///
    /// Returns `(queue, event_type)` if valid.
    #[must_use]
    pub fn parse(&self, topic: &str) -> Option<(String, String)> {
        let expected_prefix = format!("{}/{}/", self.prefix, PROTOCOL_VERSION);
        let remainder = topic.strip_prefix(&expected_prefix)?;

        let mut parts = remainder.split('/');
        let queue = parts.next().filter(|q| !q.is_empty())?;
        let event_type = parts.next().filter(|t| !t.is_empty())?;
        if parts.next().is_some() {
            return None;
        }

        Some((queue.to_string(), event_type.to_string()))
    }
}
