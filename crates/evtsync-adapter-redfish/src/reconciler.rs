//! Drives device event subscriptions toward the desired state.
//!
//! Two paths touch device subscriptions:
//!
//! - **Startup reconciliation** compares each device's subscription at its
//!   known location against the desired event types and creates, recreates
//!   or leaves it.
//! - **Explicit subscribe/unsubscribe** requests come from the aggregator
//!   with a device handle and a canonical request body.
//!
//! Duplicates are prevented by deleting every owned subscription before a
//! create, never by tracking subscription identifiers.

use crate::client::{ClientError, DeviceClient, DeviceResponse};
use crate::ownership::OwnershipClassifier;
use evtsync_core::model::{STARTUP_CONTEXT, SUBSCRIPTIONS_URI, SUBSCRIPTION_PROTOCOL};
use evtsync_core::{
    AddressTranslator, Device, DeviceData, EventSubscriptionRequest, NegotiationPolicy,
    SubscriptionCollection, SubscriptionRecord, SubscriptionState,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Host devices deliver events to
    pub lb_host: String,
    /// Port devices deliver events to
    pub lb_port: String,
    /// Listener path devices deliver events to
    pub destination_uri: String,
    /// Feature sets tried when a device rejects a subscription
    pub policy: NegotiationPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            lb_host: "localhost".to_string(),
            lb_port: "45002".to_string(),
            destination_uri: "/redfishEventListener".to_string(),
            policy: NegotiationPolicy::default(),
        }
    }
}

/// Keeps device subscriptions consistent with the aggregator's desired state.
#[derive(Clone)]
pub struct SubscriptionReconciler {
    client: Arc<dyn DeviceClient>,
    translator: Arc<AddressTranslator>,
    ownership: OwnershipClassifier,
    policy: Arc<NegotiationPolicy>,
    destination: String,
}

impl SubscriptionReconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(
        client: Arc<dyn DeviceClient>,
        translator: Arc<AddressTranslator>,
        config: ReconcilerConfig,
    ) -> Self {
        let ownership = OwnershipClassifier::new(client.clone(), &config.lb_host, &config.lb_port);
        let destination = format!(
            "https://{}:{}{}",
            config.lb_host, config.lb_port, config.destination_uri
        );

        Self {
            client,
            translator,
            ownership,
            policy: Arc::new(config.policy),
            destination,
        }
    }

    /// Canonical callback URL written into every subscription.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Subscribe a device on behalf of the aggregator.
    ///
    /// The canonical body in `device.post_body` is translated southbound,
    /// every owned subscription on the device is removed, and the request is
    /// posted once per feature set of the negotiation policy until the device
    /// answers 201. The last answer is returned translated northbound.
    ///
    /// # Errors
    ///
    /// Returns error if the body is not a subscription request, the device
    /// is unreachable, or the device rejects the credentials.
    pub async fn create_subscription(
        &self,
        device: &Device,
    ) -> Result<DeviceResponse, ReconcileError> {
        let body = self.translator.to_southbound_bytes(&device.post_body);
        let requested: EventSubscriptionRequest = serde_json::from_slice(&body)
            .map_err(|e| ReconcileError::InvalidBody(e.to_string()))?;

        self.delete_matching(device).await;

        let request = EventSubscriptionRequest {
            destination: self.destination.clone(),
            ..requested
        };

        let mut feature_sets = self.policy.feature_sets();
        let first = feature_sets.next().unwrap_or_default();
        let mut response = self
            .post_subscription(device, &request.with_features(first))
            .await?;

        for features in feature_sets {
            if response.status == 201 {
                break;
            }
            tracing::warn!(
                host = %device.host,
                status = response.status,
                ?features,
                "Device rejected subscription, retrying with reduced features"
            );
            response = self
                .post_subscription(device, &request.with_features(features))
                .await?;
        }

        self.finish(device, response)
    }

    /// Remove the subscription at `device.location`.
    ///
    /// # Errors
    ///
    /// Returns error if the location is empty, the device is unreachable or
    /// rejects the credentials.
    pub async fn delete_subscription(
        &self,
        device: &Device,
    ) -> Result<DeviceResponse, ReconcileError> {
        if device.location.trim().is_empty() {
            return Err(ReconcileError::InvalidBody(
                "subscription location is empty".to_string(),
            ));
        }
        let response = self.client.delete(device, &device.location).await?;
        self.finish(device, response)
    }

    /// Delete every subscription on the device that points back at us.
    ///
    /// Failures are logged and never abort the caller.
    pub async fn delete_matching(&self, device: &Device) {
        let response = match self.client.get(device, SUBSCRIPTIONS_URI).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, host = %device.host, "Failed to list subscriptions");
                return;
            }
        };

        if response.status != 200 {
            tracing::error!(
                host = %device.host,
                status = response.status,
                "Unexpected status while listing subscriptions"
            );
            return;
        }

        let collection: SubscriptionCollection = match serde_json::from_slice(&response.body) {
            Ok(collection) => collection,
            Err(e) => {
                tracing::error!(error = %e, host = %device.host, "Unreadable subscription collection");
                return;
            }
        };

        for member in collection.members {
            let target = device.at(member.odata_id);
            if !self.ownership.is_ours(&target).await {
                continue;
            }
            match self.client.delete(&target, &target.location).await {
                Ok(response) => tracing::info!(
                    host = %device.host,
                    location = %target.location,
                    status = response.status,
                    "Deleted owned subscription"
                ),
                Err(e) => tracing::error!(
                    error = %e,
                    host = %device.host,
                    location = %target.location,
                    "Failed to delete owned subscription"
                ),
            }
        }
    }

    /// Bring one device's subscription in line with `desired` event types.
    ///
    /// Returns the location of the resulting subscription.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or any status other than 200/404
    /// for the existing subscription; the device is left as observed.
    pub async fn reconcile_device(
        &self,
        device: &Device,
        desired: &[String],
    ) -> Result<String, ReconcileError> {
        let observed = if device.location.is_empty() {
            None
        } else {
            let response = self.client.get(device, &device.location).await?;
            match response.status {
                200 => Some(
                    serde_json::from_slice::<SubscriptionRecord>(&response.body)
                        .map_err(|e| ReconcileError::InvalidBody(e.to_string()))?,
                ),
                404 => None,
                status => {
                    return Err(ReconcileError::Status {
                        url: device.location.clone(),
                        status,
                    })
                }
            }
        };

        match SubscriptionState::classify(observed.as_ref(), desired) {
            SubscriptionState::SubscribedMatching => {
                tracing::debug!(host = %device.host, "Subscription already up to date");
                Ok(device.location.clone())
            }
            SubscriptionState::SubscribedMismatched => {
                tracing::info!(host = %device.host, ?desired, "Event types changed, resubscribing");
                let response = self.client.delete(device, &device.location).await?;
                if !response.is_success() && response.status != 404 {
                    return Err(ReconcileError::Status {
                        url: device.location.clone(),
                        status: response.status,
                    });
                }
                self.create_startup_subscription(device, desired).await
            }
            SubscriptionState::NoSubscription => {
                tracing::info!(host = %device.host, "No subscription found, creating one");
                self.create_startup_subscription(device, desired).await
            }
        }
    }

    /// Reconcile a batch of devices concurrently.
    ///
    /// Returns `host -> location` for every device, or the first error
    /// reported if any device failed.
    ///
    /// # Errors
    ///
    /// Returns the first per-device failure; partial results are discarded.
    pub async fn reconcile_startup<I>(
        &self,
        devices: I,
    ) -> Result<HashMap<String, String>, ReconcileError>
    where
        I: IntoIterator<Item = DeviceData>,
    {
        let (success_tx, mut success_rx) = mpsc::unbounded_channel::<(String, String)>();
        let (error_tx, mut error_rx) = mpsc::unbounded_channel::<ReconcileError>();
        let (quit_tx, mut quit_rx) = oneshot::channel::<()>();

        let collector = tokio::spawn(async move {
            let mut locations = HashMap::new();
            let mut first_error = None;
            loop {
                tokio::select! {
                    biased;
                    Some((host, location)) = success_rx.recv() => {
                        locations.insert(host, location);
                    }
                    Some(err) = error_rx.recv() => {
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                    _ = &mut quit_rx => break,
                }
            }
            (locations, first_error)
        });

        let mut tasks = Vec::new();
        for data in devices {
            let reconciler = self.clone();
            let success_tx = success_tx.clone();
            let error_tx = error_tx.clone();
            tasks.push(tokio::spawn(async move {
                let device = data.to_device();
                let desired = data.desired_event_types();
                match reconciler.reconcile_device(&device, &desired).await {
                    Ok(location) => {
                        let _ = success_tx.send((device.host, location));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, host = %device.host, "Startup reconciliation failed");
                        let _ = error_tx.send(e);
                    }
                }
            }));
        }

        for task in tasks {
            if let Err(e) = task.await {
                let _ = error_tx.send(ReconcileError::Task(e.to_string()));
            }
        }
        let _ = quit_tx.send(());

        let (locations, first_error) = collector
            .await
            .map_err(|e| ReconcileError::Task(e.to_string()))?;

        match first_error {
            Some(e) => Err(e),
            None => Ok(locations),
        }
    }

    async fn create_startup_subscription(
        &self,
        device: &Device,
        event_types: &[String],
    ) -> Result<String, ReconcileError> {
        let request = EventSubscriptionRequest {
            destination: self.destination.clone(),
            event_types: event_types.to_vec(),
            context: STARTUP_CONTEXT.to_string(),
            protocol: SUBSCRIPTION_PROTOCOL.to_string(),
            ..Default::default()
        };

        let response = self.post_subscription(device, &request).await?;
        if response.status == 401 {
            return Err(ReconcileError::Authentication(device.host.clone()));
        }
        if !response.is_success() {
            return Err(ReconcileError::Status {
                url: SUBSCRIPTIONS_URI.to_string(),
                status: response.status,
            });
        }

        Ok(response.location.unwrap_or_default())
    }

    async fn post_subscription(
        &self,
        device: &Device,
        request: &EventSubscriptionRequest,
    ) -> Result<DeviceResponse, ReconcileError> {
        let body =
            serde_json::to_vec(request).map_err(|e| ReconcileError::InvalidBody(e.to_string()))?;
        Ok(self.client.post(device, SUBSCRIPTIONS_URI, body).await?)
    }

    fn finish(
        &self,
        device: &Device,
        response: DeviceResponse,
    ) -> Result<DeviceResponse, ReconcileError> {
        if response.status == 401 {
            return Err(ReconcileError::Authentication(device.host.clone()));
        }
        if response.status >= 300 {
            tracing::warn!(
                host = %device.host,
                status = response.status,
                body = %String::from_utf8_lossy(&response.body),
                "Subscription operation failed"
            );
        }

        Ok(DeviceResponse {
            status: response.status,
            location: response
                .location
                .map(|location| self.translator.to_northbound(&location)),
            body: self.translator.to_northbound_bytes(&response.body),
        })
    }
}

/// Errors that can occur reconciling a device.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReconcileError {
    /// Device unreachable or TLS failure
    #[error("connection error: {0}")]
    Connection(String),
    /// Device rejected the credentials
    #[error("authentication with device {0} failed")]
    Authentication(String),
    /// Device answered with a status the operation cannot continue from
    #[error("unexpected status {status} from {url}")]
    Status {
        /// Requested resource
        url: String,
        /// HTTP status code
        status: u16,
    },
    /// A subscription body could not be read or written
    #[error("invalid subscription body: {0}")]
    InvalidBody(String),
    /// A reconciliation task did not run to completion
    #[error("reconciliation task failed: {0}")]
    Task(String),
}

impl From<ClientError> for ReconcileError {
    fn from(err: ClientError) -> Self {
        Self::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use evtsync_core::{EventSubscriptionInfo, TranslationRule};
    use serde_json::{json, Value};
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Call {
        method: &'static str,
        target: String,
        body: Option<Value>,
    }

    #[derive(Default)]
    struct FakeState {
        subscriptions: BTreeMap<String, Value>,
        next_id: u32,
        reject_message_ids: bool,
        post_status: Option<u16>,
        failing_hosts: HashSet<String>,
        unreachable_collection: bool,
        unreachable_deletes: bool,
        calls: Vec<Call>,
    }

    /// In-memory Redfish event service that records every call.
    #[derive(Default)]
    struct FakeDevice {
        state: Mutex<FakeState>,
    }

    impl FakeDevice {
        fn seed(&self, destination: &str, event_types: &[&str]) -> String {
            self.seed_raw(destination, json!(event_types))
        }

        fn seed_raw(&self, destination: &str, event_types: Value) -> String {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let path = format!("{SUBSCRIPTIONS_URI}/{}", state.next_id);
            state.subscriptions.insert(
                path.clone(),
                json!({"@odata.id": path, "Destination": destination, "EventTypes": event_types}),
            );
            path
        }

        fn calls(&self, method: &str) -> Vec<Call> {
            let state = self.state.lock().unwrap();
            state
                .calls
                .iter()
                .filter(|call| call.method == method)
                .cloned()
                .collect()
        }

        fn mutations(&self) -> usize {
            self.calls("POST").len() + self.calls("DELETE").len()
        }

        fn respond(&self, status: u16, location: Option<String>, body: &Value) -> DeviceResponse {
            DeviceResponse {
                status,
                location,
                body: serde_json::to_vec(body).unwrap(),
            }
        }
    }

    #[async_trait]
    impl DeviceClient for FakeDevice {
        async fn get(&self, device: &Device, target: &str) -> Result<DeviceResponse, ClientError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call {
                method: "GET",
                target: target.to_string(),
                body: None,
            });
            if state.failing_hosts.contains(&device.host) {
                return Ok(self.respond(503, None, &Value::Null));
            }
            if target == SUBSCRIPTIONS_URI {
                if state.unreachable_collection {
                    return Err(ClientError::Request("connection reset".to_string()));
                }
                let members: Vec<Value> = state
                    .subscriptions
                    .keys()
                    .map(|path| json!({"@odata.id": path}))
                    .collect();
                return Ok(self.respond(200, None, &json!({"Members": members})));
            }
            Ok(match state.subscriptions.get(target) {
                Some(record) => self.respond(200, None, record),
                None => self.respond(404, None, &Value::Null),
            })
        }

        async fn post(
            &self,
            _: &Device,
            target: &str,
            body: Vec<u8>,
        ) -> Result<DeviceResponse, ClientError> {
            let mut state = self.state.lock().unwrap();
            let mut body: Value = serde_json::from_slice(&body).unwrap();
            state.calls.push(Call {
                method: "POST",
                target: target.to_string(),
                body: Some(body.clone()),
            });
            if let Some(status) = state.post_status {
                return Ok(self.respond(status, None, &json!({"error": "rejected"})));
            }
            if state.reject_message_ids && body.get("MessageIds").is_some() {
                return Ok(self.respond(400, None, &json!({"error": "MessageIds"})));
            }
            state.next_id += 1;
            let path = format!("{SUBSCRIPTIONS_URI}/{}", state.next_id);
            body["@odata.id"] = json!(path);
            state.subscriptions.insert(path.clone(), body);
            Ok(self.respond(201, Some(path), &Value::Null))
        }

        async fn delete(&self, _: &Device, target: &str) -> Result<DeviceResponse, ClientError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call {
                method: "DELETE",
                target: target.to_string(),
                body: None,
            });
            if state.unreachable_deletes {
                return Err(ClientError::Request("connection reset".to_string()));
            }
            let status = if state.subscriptions.remove(target).is_some() {
                200
            } else {
                404
            };
            Ok(self.respond(status, None, &Value::Null))
        }

        async fn patch(&self, _: &Device, _: &str, _: Vec<u8>) -> Result<DeviceResponse, ClientError> {
            Ok(self.respond(405, None, &Value::Null))
        }
    }

    const OURS: &str = "https://lb.odim:45002/redfishEventListener";

    fn reconciler(fake: &Arc<FakeDevice>) -> SubscriptionReconciler {
        let translator = AddressTranslator::new(
            vec![TranslationRule::new("/ODIM/v1", "/redfish/v1")],
            vec![TranslationRule::new("/redfish/v1", "/ODIM/v1")],
        );
        SubscriptionReconciler::new(
            fake.clone(),
            Arc::new(translator),
            ReconcilerConfig {
                lb_host: "lb.odim".to_string(),
                lb_port: "45002".to_string(),
                ..Default::default()
            },
        )
    }

    fn types(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn explicit_device(body: &Value) -> Device {
        Device {
            post_body: serde_json::to_vec(body).unwrap(),
            ..Device::new("10.0.0.5", "root", "secret")
        }
    }

    fn canonical_request() -> Value {
        json!({
            "Destination": "https://aggregator/ODIM/v1/EventListener",
            "EventTypes": ["Alert"],
            "MessageIds": ["iDRAC.2.1.SYS1001"],
            "Context": "ODIMRA_Event",
            "Protocol": "Redfish"
        })
    }

    #[tokio::test]
    async fn destination_is_canonical_callback() {
        let fake = Arc::new(FakeDevice::default());
        assert_eq!(reconciler(&fake).destination(), OURS);
    }

    #[tokio::test]
    async fn startup_reconcile_is_idempotent() {
        let fake = Arc::new(FakeDevice::default());
        let reconciler = reconciler(&fake);
        let device = Device::new("10.0.0.5", "root", "secret")
            .at(format!("{SUBSCRIPTIONS_URI}/missing"));

        let location = reconciler
            .reconcile_device(&device, &types(&["Alert"]))
            .await
            .unwrap();
        assert_eq!(fake.mutations(), 1);

        let again = reconciler
            .reconcile_device(&device.at(location.clone()), &types(&["Alert"]))
            .await
            .unwrap();
        assert_eq!(again, location);
        assert_eq!(fake.mutations(), 1);
    }

    #[tokio::test]
    async fn startup_missing_subscription_is_created() {
        let fake = Arc::new(FakeDevice::default());
        let device = Device::new("10.0.0.5", "root", "secret")
            .at(format!("{SUBSCRIPTIONS_URI}/gone"));

        let location = reconciler(&fake)
            .reconcile_device(&device, &types(&["Alert"]))
            .await
            .unwrap();

        let posts = fake.calls("POST");
        assert_eq!(posts.len(), 1);
        let body = posts[0].body.as_ref().unwrap();
        assert_eq!(body["Destination"], OURS);
        assert_eq!(body["Context"], "Event Subscription");
        assert_eq!(body["Protocol"], "Redfish");
        assert_eq!(body["EventTypes"], json!(["Alert"]));
        assert_eq!(location, format!("{SUBSCRIPTIONS_URI}/1"));
    }

    #[tokio::test]
    async fn changed_event_types_resubscribe_once() {
        let fake = Arc::new(FakeDevice::default());
        let path = fake.seed(OURS, &["Alert"]);
        let device = Device::new("10.0.0.5", "root", "secret").at(path.clone());

        reconciler(&fake)
            .reconcile_device(&device, &types(&["Alert", "StatusChange"]))
            .await
            .unwrap();

        let deletes = fake.calls("DELETE");
        let posts = fake.calls("POST");
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].target, path);
        assert_eq!(posts.len(), 1);
        assert_eq!(
            posts[0].body.as_ref().unwrap()["EventTypes"],
            json!(["Alert", "StatusChange"])
        );
        assert_eq!(fake.calls("GET").len(), 1);
    }

    #[tokio::test]
    async fn startup_unexpected_status_leaves_device_untouched() {
        let fake = Arc::new(FakeDevice::default());
        let path = fake.seed(OURS, &["Alert"]);
        fake.state
            .lock()
            .unwrap()
            .failing_hosts
            .insert("10.0.0.5".to_string());
        let device = Device::new("10.0.0.5", "root", "secret").at(path);

        let err = reconciler(&fake)
            .reconcile_device(&device, &types(&["StatusChange"]))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Status { status: 503, .. }));
        assert_eq!(fake.mutations(), 0);
    }

    #[tokio::test]
    async fn rejected_subscription_is_posted_exactly_twice() {
        let fake = Arc::new(FakeDevice::default());
        fake.state.lock().unwrap().post_status = Some(400);

        let response = reconciler(&fake)
            .create_subscription(&explicit_device(&canonical_request()))
            .await
            .unwrap();

        let posts = fake.calls("POST");
        assert_eq!(posts.len(), 2);
        assert!(posts[0].body.as_ref().unwrap().get("MessageIds").is_some());
        assert!(posts[1].body.as_ref().unwrap().get("MessageIds").is_none());
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn message_ids_dropped_for_non_conformant_device() {
        let fake = Arc::new(FakeDevice::default());
        fake.state.lock().unwrap().reject_message_ids = true;

        let response = reconciler(&fake)
            .create_subscription(&explicit_device(&canonical_request()))
            .await
            .unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(fake.calls("POST").len(), 2);
    }

    #[tokio::test]
    async fn accepted_subscription_is_posted_once() {
        let fake = Arc::new(FakeDevice::default());

        let response = reconciler(&fake)
            .create_subscription(&explicit_device(&canonical_request()))
            .await
            .unwrap();

        let posts = fake.calls("POST");
        assert_eq!(posts.len(), 1);
        let body = posts[0].body.as_ref().unwrap();
        assert_eq!(body["Destination"], OURS);
        assert_eq!(body["Context"], "ODIMRA_Event");
        assert_eq!(response.status, 201);
        assert_eq!(
            response.location.as_deref(),
            Some("/ODIM/v1/EventService/Subscriptions/1")
        );
    }

    #[tokio::test]
    async fn subscribe_deletes_only_owned_subscriptions() {
        let fake = Arc::new(FakeDevice::default());
        let ours = fake.seed(OURS, &["Alert"]);
        fake.seed("https://other-aggregator:9000/events", &["Alert"]);

        reconciler(&fake)
            .create_subscription(&explicit_device(&canonical_request()))
            .await
            .unwrap();

        let deletes = fake.calls("DELETE");
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].target, ours);
        assert_eq!(fake.state.lock().unwrap().subscriptions.len(), 2);
    }

    #[tokio::test]
    async fn subscribe_proceeds_when_owned_delete_fails() {
        let fake = Arc::new(FakeDevice::default());
        fake.seed(OURS, &["Alert"]);
        fake.state.lock().unwrap().unreachable_deletes = true;

        let response = reconciler(&fake)
            .create_subscription(&explicit_device(&canonical_request()))
            .await
            .unwrap();

        assert_eq!(fake.calls("DELETE").len(), 1);
        assert_eq!(fake.calls("POST").len(), 1);
        assert_eq!(response.status, 201);
    }

    #[tokio::test]
    async fn subscribe_proceeds_when_collection_unreachable() {
        let fake = Arc::new(FakeDevice::default());
        fake.seed(OURS, &["Alert"]);
        fake.state.lock().unwrap().unreachable_collection = true;

        let response = reconciler(&fake)
            .create_subscription(&explicit_device(&canonical_request()))
            .await
            .unwrap();

        assert!(fake.calls("DELETE").is_empty());
        assert_eq!(fake.calls("POST").len(), 1);
        assert_eq!(response.status, 201);
    }

    #[tokio::test]
    async fn subscribe_replaces_owned_subscription_with_null_event_types() {
        let fake = Arc::new(FakeDevice::default());
        let ours = fake.seed_raw(OURS, Value::Null);

        reconciler(&fake)
            .create_subscription(&explicit_device(&canonical_request()))
            .await
            .unwrap();

        let deletes = fake.calls("DELETE");
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].target, ours);
        let owned = fake
            .state
            .lock()
            .unwrap()
            .subscriptions
            .values()
            .filter(|record| record["Destination"] == OURS)
            .count();
        assert_eq!(owned, 1);
    }

    #[tokio::test]
    async fn startup_resubscribes_when_event_types_unreadable() {
        let fake = Arc::new(FakeDevice::default());
        let path = fake.seed_raw(OURS, json!("Alert"));
        let device = Device::new("10.0.0.5", "root", "secret").at(path.clone());

        let location = reconciler(&fake)
            .reconcile_device(&device, &types(&["Alert"]))
            .await
            .unwrap();

        let deletes = fake.calls("DELETE");
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].target, path);
        assert_eq!(fake.calls("POST").len(), 1);
        assert_ne!(location, path);
    }

    #[tokio::test]
    async fn device_401_is_authentication_error() {
        let fake = Arc::new(FakeDevice::default());
        fake.state.lock().unwrap().post_status = Some(401);

        let err = reconciler(&fake)
            .create_subscription(&explicit_device(&canonical_request()))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Authentication(host) if host == "10.0.0.5"));
    }

    #[tokio::test]
    async fn malformed_post_body_is_rejected_before_device_calls() {
        let fake = Arc::new(FakeDevice::default());
        let device = Device {
            post_body: b"not json".to_vec(),
            ..Device::new("10.0.0.5", "root", "secret")
        };

        let err = reconciler(&fake).create_subscription(&device).await.unwrap_err();

        assert!(matches!(err, ReconcileError::InvalidBody(_)));
        assert!(fake.state.lock().unwrap().calls.is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_is_a_single_delete() {
        let fake = Arc::new(FakeDevice::default());
        let path = fake.seed(OURS, &["Alert"]);
        let device = Device::new("10.0.0.5", "root", "secret").at(path);

        let response = reconciler(&fake).delete_subscription(&device).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(fake.state.lock().unwrap().calls.len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_without_location_is_rejected() {
        let fake = Arc::new(FakeDevice::default());
        let device = Device::new("10.0.0.5", "root", "secret");

        let err = reconciler(&fake).delete_subscription(&device).await.unwrap_err();

        assert!(matches!(err, ReconcileError::InvalidBody(_)));
        assert!(fake.state.lock().unwrap().calls.is_empty());
    }

    fn startup_device(address: &str, location: &str, event_types: &[&str]) -> DeviceData {
        DeviceData {
            user_name: "root".to_string(),
            password: b"secret".to_vec(),
            address: address.to_string(),
            operation: "add".to_string(),
            event_subscription_info: Some(EventSubscriptionInfo {
                event_types: types(event_types),
                location: location.to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn startup_batch_reports_every_location() {
        let fake = Arc::new(FakeDevice::default());
        let existing = fake.seed(OURS, &["Alert"]);

        let locations = reconciler(&fake)
            .reconcile_startup(vec![
                startup_device("10.0.0.5", &existing, &["Alert"]),
                startup_device("10.0.0.6", "", &["Alert"]),
            ])
            .await
            .unwrap();

        assert_eq!(locations.len(), 2);
        assert_eq!(locations["10.0.0.5"], existing);
        assert!(locations["10.0.0.6"].starts_with(SUBSCRIPTIONS_URI));
    }

    #[tokio::test]
    async fn startup_batch_error_discards_successes() {
        let fake = Arc::new(FakeDevice::default());
        let existing = fake.seed(OURS, &["Alert"]);
        fake.state
            .lock()
            .unwrap()
            .failing_hosts
            .insert("10.0.0.9".to_string());

        let result = reconciler(&fake)
            .reconcile_startup(vec![
                startup_device("10.0.0.5", &existing, &["Alert"]),
                startup_device("10.0.0.9", &existing, &["Alert"]),
            ])
            .await;

        assert!(matches!(result, Err(ReconcileError::Status { status: 503, .. })));
    }
}
