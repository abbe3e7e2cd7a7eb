//! Message bus sink for ingested events.

use async_trait::async_trait;
use evtsync_core::IngestionEvent;
use evtsync_proto::{EventEnvelope, TopicScheme};
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Destination for events leaving the pipeline.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish one event.
    async fn publish(&self, event: &IngestionEvent) -> Result<(), BusError>;
}

/// [`MessageBus`] publishing CBOR envelopes over MQTT.
pub struct MqttBus {
    client: AsyncClient,
    topic_scheme: TopicScheme,
    queues: Vec<String>,
    plugin_id: String,
}

impl MqttBus {
    /// Create a bus client; the returned event loop must be driven by
    /// [`run_event_loop`] for publishes to reach the broker.
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL is invalid.
    pub fn new(
        mqtt_broker: &str,
        client_id: &str,
        topic_scheme: TopicScheme,
        queues: Vec<String>,
        plugin_id: impl Into<String>,
    ) -> Result<(Self, EventLoop), BusError> {
        let (host, port) = parse_mqtt_url(mqtt_broker)?;

        let mut mqtt_options = MqttOptions::new(client_id, host, port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));

        let (client, eventloop) = AsyncClient::new(mqtt_options, 100);

        Ok((
            Self {
                client,
                topic_scheme,
                queues,
                plugin_id: plugin_id.into(),
            },
            eventloop,
        ))
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn publish(&self, event: &IngestionEvent) -> Result<(), BusError> {
        let payload = EventEnvelope::new(event.clone(), self.plugin_id.clone())
            .to_cbor()
            .map_err(|e| BusError::Serialize(e.to_string()))?;

        for queue in &self.queues {
            let topic = self.topic_scheme.event(queue, &event.event_type);

            tracing::debug!(topic, payload_len = payload.len(), ip = %event.ip, "Publishing event");

            self.client
                .publish(&topic, QoS::AtLeastOnce, false, payload.clone())
                .await
                .map_err(|e| BusError::Publish(e.to_string()))?;
        }

        Ok(())
    }
}

/// Poll the MQTT event loop until cancelled.
pub async fn run_event_loop(mut eventloop: EventLoop, cancel: CancellationToken) {
    loop {
        tokio::select! {
            event = eventloop.poll() => {
                if let Err(e) = event {
                    tracing::error!(error = %e, "MQTT error");
                    tokio::select! {
                        () = tokio::time::sleep(Duration::from_secs(5)) => {}
                        () = cancel.cancelled() => break,
                    }
                }
            }
            () = cancel.cancelled() => break,
        }
    }
    tracing::debug!("MQTT event loop stopped");
}

/// Parse MQTT URL into host and port.
fn parse_mqtt_url(input: &str) -> Result<(String, u16), BusError> {
    if input.contains("://") {
        let url =
            Url::parse(input).map_err(|e| BusError::InvalidBrokerUrl(format!("{input}: {e}")))?;

        match url.scheme() {
            "tcp" | "mqtt" => {}
            scheme => {
                return Err(BusError::InvalidBrokerUrl(format!(
                    "{input}: unsupported scheme '{scheme}'"
                )));
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| BusError::InvalidBrokerUrl(format!("{input}: missing host")))?;
        let port = url.port().unwrap_or(1883);

        return Ok((host.to_string(), port));
    }

    let (host, port) = match input.split_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| {
                BusError::InvalidBrokerUrl(format!("{input}: invalid port '{port}'"))
            })?;
            (host, port)
        }
        None => (input, 1883),
    };
    if host.is_empty() {
        return Err(BusError::InvalidBrokerUrl(format!("{input}: missing host")));
    }

    Ok((host.to_string(), port))
}

/// Errors for bus operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    /// Invalid MQTT broker URL
    #[error("invalid MQTT broker URL: {0}")]
    InvalidBrokerUrl(String),
    /// Publish failed
    #[error("publish error: {0}")]
    Publish(String),
    /// Serialization failed
    #[error("serialize error: {0}")]
    Serialize(String),
}
