//! Attribution of on-device subscriptions to this deployment.

use crate::client::DeviceClient;
use evtsync_core::Device;
use std::sync::Arc;

/// Decides whether a device subscription was created by this deployment.
#[derive(Clone)]
pub struct OwnershipClassifier {
    client: Arc<dyn DeviceClient>,
    callback: String,
}

impl OwnershipClassifier {
    /// Create a classifier matching destinations against `{lb_host}:{lb_port}`.
    #[must_use]
    pub fn new(client: Arc<dyn DeviceClient>, lb_host: &str, lb_port: &str) -> Self {
        Self {
            client,
            callback: format!("{lb_host}:{lb_port}"),
        }
    }

    /// The `host:port` every owned destination contains.
    #[must_use]
    pub fn callback(&self) -> &str {
        &self.callback
    }

    /// Whether a registered destination points back at this deployment.
    #[must_use]
    pub fn matches_destination(&self, destination: &str) -> bool {
        destination.contains(&self.callback)
    }

    /// GET `device.location` and check its `Destination`.
    ///
    /// Transport errors, non-200 answers, unreadable bodies, and records
    /// without a destination all yield `false`.
    pub async fn is_ours(&self, device: &Device) -> bool {
        let response = match self.client.get(device, &device.location).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, location = %device.location, "Failed to fetch subscription");
                return false;
            }
        };

        if response.status != 200 {
            tracing::error!(
                location = %device.location,
                status = response.status,
                "Unexpected status while fetching subscription"
            );
            return false;
        }

        // Only Destination decides; other fields vary across device dialects.
        let record: serde_json::Value = match serde_json::from_slice(&response.body) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(error = %e, location = %device.location, "Unreadable subscription body");
                return false;
            }
        };

        record
            .get("Destination")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|destination| self.matches_destination(destination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, DeviceResponse};
    use async_trait::async_trait;

    struct FixedClient(Result<DeviceResponse, ClientError>);

    #[async_trait]
    impl DeviceClient for FixedClient {
        async fn get(&self, _: &Device, _: &str) -> Result<DeviceResponse, ClientError> {
            self.0.clone()
        }

        async fn post(&self, _: &Device, _: &str, _: Vec<u8>) -> Result<DeviceResponse, ClientError> {
            unreachable!("classification never posts")
        }

        async fn delete(&self, _: &Device, _: &str) -> Result<DeviceResponse, ClientError> {
            unreachable!("classification never deletes")
        }

        async fn patch(&self, _: &Device, _: &str, _: Vec<u8>) -> Result<DeviceResponse, ClientError> {
            unreachable!("classification never patches")
        }
    }

    fn classifier(answer: Result<DeviceResponse, ClientError>) -> OwnershipClassifier {
        OwnershipClassifier::new(Arc::new(FixedClient(answer)), "lb.odim", "45002")
    }

    fn device() -> Device {
        Device::new("bmc", "root", "secret").at("/redfish/v1/EventService/Subscriptions/1")
    }

    fn answer(status: u16, body: &str) -> Result<DeviceResponse, ClientError> {
        Ok(DeviceResponse {
            status,
            location: None,
            body: body.as_bytes().to_vec(),
        })
    }

    #[tokio::test]
    async fn matching_destination_is_ours() {
        let classifier = classifier(answer(
            200,
            r#"{"Destination": "https://lb.odim:45002/redfishEventListener"}"#,
        ));
        assert!(classifier.is_ours(&device()).await);
    }

    #[tokio::test]
    async fn owned_regardless_of_event_types_shape() {
        for event_types in ["null", r#""Alert""#, "42"] {
            let body = format!(
                r#"{{"Destination": "https://lb.odim:45002/redfishEventListener", "EventTypes": {event_types}}}"#
            );
            assert!(
                classifier(answer(200, &body)).is_ours(&device()).await,
                "EventTypes = {event_types}"
            );
        }
    }

    #[tokio::test]
    async fn foreign_destination_is_not_ours() {
        let classifier = classifier(answer(
            200,
            r#"{"Destination": "https://other:9000/listener"}"#,
        ));
        assert!(!classifier.is_ours(&device()).await);
    }

    #[tokio::test]
    async fn failures_are_not_ours() {
        assert!(!classifier(answer(500, "")).is_ours(&device()).await);
        assert!(!classifier(answer(200, "not json")).is_ours(&device()).await);
        assert!(!classifier(answer(200, r#"{"EventTypes": ["Alert"]}"#))
            .is_ours(&device())
            .await);
        assert!(
            !classifier(Err(ClientError::Request("connection refused".to_string())))
                .is_ours(&device())
                .await
        );
    }
}
