//! Agent configuration.

use evtsync_core::{parse_rules, TranslationRule};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Northbound plugin API
    pub plugin: PluginConfig,

    /// Callback address devices deliver events to
    pub load_balancer: LoadBalancerConfig,

    /// Webhook listener
    pub event: EventConfig,

    /// Message bus
    pub bus: BusConfig,

    /// Southbound device access
    pub device: DeviceConfig,

    /// Address translation tables
    pub translation: TranslationConfig,

    /// Ingestion pipeline sizing
    pub pipeline: PipelineConfig,

    /// Idle time after which a session token expires
    pub session_timeout: Duration,

    /// Bound on capability negotiation steps
    pub max_degradations: usize,
}

/// Northbound plugin API configuration.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Plugin identifier
    pub id: String,

    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Username accepted for Basic auth and sessions
    pub username: String,

    /// Password accepted for Basic auth and sessions
    pub password: String,

    /// Version reported by the status endpoint
    pub firmware_version: String,

    /// Address reported as the originator of the startup event
    pub originator_id: Option<String>,
}

/// Canonical callback address.
#[derive(Debug, Clone)]
pub struct LoadBalancerConfig {
    /// Callback host
    pub host: String,

    /// Callback port
    pub port: String,
}

/// Webhook listener configuration.
#[derive(Debug, Clone)]
pub struct EventConfig {
    /// Path devices post events to
    pub dest_uri: String,

    /// Bind host
    pub listener_host: String,

    /// Bind port
    pub listener_port: u16,
}

/// Message bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// MQTT broker URL
    pub mqtt_broker: String,

    /// Queues every event is published to
    pub queues: Vec<String>,
}

/// Device access configuration.
#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    /// CA bundle trusted for device certificates
    pub ca_cert_path: Option<PathBuf>,

    /// Optional request deadline
    pub timeout: Option<Duration>,
}

/// Translation tables.
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    /// Canonical-to-vendor rules
    pub southbound: Vec<TranslationRule>,

    /// Vendor-to-canonical rules
    pub northbound: Vec<TranslationRule>,
}

/// Ingestion pipeline sizing.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bounded queue capacity
    pub capacity: usize,

    /// Number of publishing workers
    pub workers: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            plugin: PluginConfig {
                id: "REDFISH".to_string(),
                host: "0.0.0.0".to_string(),
                port: 45001,
                username: "admin".to_string(),
                password: String::new(),
                firmware_version: "v1.0.0".to_string(),
                originator_id: None,
            },
            load_balancer: LoadBalancerConfig {
                host: "localhost".to_string(),
                port: "45002".to_string(),
            },
            event: EventConfig {
                dest_uri: "/redfishEventListener".to_string(),
                listener_host: "0.0.0.0".to_string(),
                listener_port: 45002,
            },
            bus: BusConfig {
                mqtt_broker: "tcp://localhost:1883".to_string(),
                queues: vec!["REDFISH-EVENTS-TOPIC".to_string()],
            },
            device: DeviceConfig::default(),
            translation: TranslationConfig {
                southbound: vec![TranslationRule::new("ODIM", "redfish")],
                northbound: vec![TranslationRule::new("redfish", "ODIM")],
            },
            pipeline: PipelineConfig {
                capacity: 10,
                workers: 5,
            },
            session_timeout: Duration::from_secs(30 * 60),
            max_degradations: 1,
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `EVTSYNC_PLUGIN_ID`: Plugin identifier
    /// - `EVTSYNC_PLUGIN_HOST` / `EVTSYNC_PLUGIN_PORT`: Northbound API bind
    /// - `EVTSYNC_PLUGIN_USERNAME` / `EVTSYNC_PLUGIN_PASSWORD`: Plugin credentials
    /// - `EVTSYNC_FIRMWARE_VERSION`: Version reported in status
    /// - `EVTSYNC_POD_IP`: Originator of the startup event
    /// - `EVTSYNC_LB_HOST` / `EVTSYNC_LB_PORT`: Canonical callback address
    /// - `EVTSYNC_EVENT_DEST_URI`: Webhook path
    /// - `EVTSYNC_EVENT_LISTENER_HOST` / `EVTSYNC_EVENT_LISTENER_PORT`: Webhook bind
    /// - `EVTSYNC_MQTT_BROKER`: MQTT broker URL
    /// - `EVTSYNC_BUS_QUEUES`: Comma separated bus queues
    /// - `EVTSYNC_CA_CERT_PATH`: Device CA bundle
    /// - `EVTSYNC_DEVICE_TIMEOUT_SECS`: Device request deadline
    /// - `EVTSYNC_SOUTHBOUND_RULES` / `EVTSYNC_NORTHBOUND_RULES`: Translation tables (JSON)
    /// - `EVTSYNC_QUEUE_CAPACITY` / `EVTSYNC_WORKERS`: Pipeline sizing
    /// - `EVTSYNC_SESSION_TIMEOUT_MINUTES`: Session idle timeout
    /// - `EVTSYNC_MAX_DEGRADATIONS`: Capability negotiation bound
    ///
    /// # Errors
    ///
    /// Returns error if a variable is malformed or out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is malformed or out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(id) = lookup("EVTSYNC_PLUGIN_ID") {
            config.plugin.id = id;
        }
        if let Some(host) = lookup("EVTSYNC_PLUGIN_HOST") {
            config.plugin.host = host;
        }
        if let Some(port) = lookup("EVTSYNC_PLUGIN_PORT") {
            config.plugin.port = parse_number("EVTSYNC_PLUGIN_PORT", &port)?;
        }
        if let Some(username) = lookup("EVTSYNC_PLUGIN_USERNAME") {
            config.plugin.username = username;
        }
        if let Some(password) = lookup("EVTSYNC_PLUGIN_PASSWORD") {
            config.plugin.password = password;
        }
        if let Some(version) = lookup("EVTSYNC_FIRMWARE_VERSION") {
            config.plugin.firmware_version = version;
        }
        config.plugin.originator_id = lookup("EVTSYNC_POD_IP");

        if let Some(host) = lookup("EVTSYNC_LB_HOST") {
            config.load_balancer.host = host;
        }
        if let Some(port) = lookup("EVTSYNC_LB_PORT") {
            config.load_balancer.port = port;
        }

        if let Some(uri) = lookup("EVTSYNC_EVENT_DEST_URI") {
            config.event.dest_uri = uri;
        }
        if let Some(host) = lookup("EVTSYNC_EVENT_LISTENER_HOST") {
            config.event.listener_host = host;
        }
        if let Some(port) = lookup("EVTSYNC_EVENT_LISTENER_PORT") {
            config.event.listener_port = parse_number("EVTSYNC_EVENT_LISTENER_PORT", &port)?;
        }

        if let Some(broker) = lookup("EVTSYNC_MQTT_BROKER") {
            config.bus.mqtt_broker = broker;
        }
        if let Some(queues) = lookup("EVTSYNC_BUS_QUEUES") {
            config.bus.queues = queues
                .split(',')
                .map(str::trim)
                .filter(|queue| !queue.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        if let Some(path) = lookup("EVTSYNC_CA_CERT_PATH") {
            config.device.ca_cert_path = Some(PathBuf::from(path));
        }
        if let Some(secs) = lookup("EVTSYNC_DEVICE_TIMEOUT_SECS") {
            config.device.timeout = Some(Duration::from_secs(parse_number(
                "EVTSYNC_DEVICE_TIMEOUT_SECS",
                &secs,
            )?));
        }

        if let Some(rules) = lookup("EVTSYNC_SOUTHBOUND_RULES") {
            config.translation.southbound = parse_rules(&rules).map_err(|e| ConfigError::Invalid {
                name: "EVTSYNC_SOUTHBOUND_RULES",
                reason: e.to_string(),
            })?;
        }
        if let Some(rules) = lookup("EVTSYNC_NORTHBOUND_RULES") {
            config.translation.northbound = parse_rules(&rules).map_err(|e| ConfigError::Invalid {
                name: "EVTSYNC_NORTHBOUND_RULES",
                reason: e.to_string(),
            })?;
        }

        if let Some(capacity) = lookup("EVTSYNC_QUEUE_CAPACITY") {
            config.pipeline.capacity = parse_number("EVTSYNC_QUEUE_CAPACITY", &capacity)?;
        }
        if let Some(workers) = lookup("EVTSYNC_WORKERS") {
            config.pipeline.workers = parse_number("EVTSYNC_WORKERS", &workers)?;
        }
        if let Some(minutes) = lookup("EVTSYNC_SESSION_TIMEOUT_MINUTES") {
            let minutes: u64 = parse_number("EVTSYNC_SESSION_TIMEOUT_MINUTES", &minutes)?;
            config.session_timeout = Duration::from_secs(minutes * 60);
        }
        if let Some(max) = lookup("EVTSYNC_MAX_DEGRADATIONS") {
            config.max_degradations = parse_number("EVTSYNC_MAX_DEGRADATIONS", &max)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "EVTSYNC_QUEUE_CAPACITY",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.pipeline.workers == 0 {
            return Err(ConfigError::Invalid {
                name: "EVTSYNC_WORKERS",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.event.dest_uri.starts_with('/') {
            return Err(ConfigError::Invalid {
                name: "EVTSYNC_EVENT_DEST_URI",
                reason: "must start with '/'".to_string(),
            });
        }
        Ok(())
    }

    /// Address reported as the origin of plugin-generated events.
    #[must_use]
    pub fn originator(&self) -> &str {
        self.plugin
            .originator_id
            .as_deref()
            .unwrap_or(&self.plugin.host)
    }
}

fn parse_number<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: format!("'{value}': {e}"),
    })
}

/// Errors loading configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A variable is malformed or out of range
    #[error("invalid {name}: {reason}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AgentConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AgentConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.plugin.id, "REDFISH");
        assert_eq!(config.plugin.port, 45001);
        assert_eq!(config.event.dest_uri, "/redfishEventListener");
        assert_eq!(config.pipeline.capacity, 10);
        assert_eq!(config.pipeline.workers, 5);
        assert_eq!(config.session_timeout, Duration::from_secs(1800));
        assert_eq!(config.max_degradations, 1);
        assert!(config.device.timeout.is_none());
        assert_eq!(config.originator(), "0.0.0.0");
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("EVTSYNC_LB_HOST", "lb.odim"),
            ("EVTSYNC_BUS_QUEUES", "REDFISH-EVENTS-TOPIC, AUDIT ,"),
            ("EVTSYNC_DEVICE_TIMEOUT_SECS", "20"),
            ("EVTSYNC_SOUTHBOUND_RULES", r#"[["/ODIM/v1", "/redfish/v1"]]"#),
            ("EVTSYNC_WORKERS", "2"),
            ("EVTSYNC_POD_IP", "10.1.2.3"),
        ])
        .unwrap();

        assert_eq!(config.load_balancer.host, "lb.odim");
        assert_eq!(config.bus.queues, vec!["REDFISH-EVENTS-TOPIC", "AUDIT"]);
        assert_eq!(config.device.timeout, Some(Duration::from_secs(20)));
        assert_eq!(
            config.translation.southbound,
            vec![TranslationRule::new("/ODIM/v1", "/redfish/v1")]
        );
        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.originator(), "10.1.2.3");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = load(&[("EVTSYNC_QUEUE_CAPACITY", "0")]).unwrap_err();
        assert!(err.to_string().contains("EVTSYNC_QUEUE_CAPACITY"));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(load(&[("EVTSYNC_WORKERS", "many")]).is_err());
        assert!(load(&[("EVTSYNC_PLUGIN_PORT", "70000")]).is_err());
        assert!(load(&[("EVTSYNC_NORTHBOUND_RULES", "{")]).is_err());
    }
}
