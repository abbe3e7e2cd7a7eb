//! HTTP client for device Redfish services.
//!
//! Every call authenticates with the device's Basic credentials. Targets
//! may be absolute URLs or paths, which resolve against the device root
//! (`{scheme}://{host}`).

use async_trait::async_trait;
use evtsync_core::Device;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{Client, Method};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// A device's answer to one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceResponse {
    /// HTTP status code
    pub status: u16,
    /// `Location` header, if the device sent one
    pub location: Option<String>,
    /// Raw response body
    pub body: Vec<u8>,
}

impl DeviceResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Authenticated access to a device's Redfish service.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// GET a resource.
    async fn get(&self, device: &Device, target: &str) -> Result<DeviceResponse, ClientError>;

    /// POST a JSON body.
    async fn post(
        &self,
        device: &Device,
        target: &str,
        body: Vec<u8>,
    ) -> Result<DeviceResponse, ClientError>;

    /// DELETE a resource.
    async fn delete(&self, device: &Device, target: &str) -> Result<DeviceResponse, ClientError>;

    /// PATCH a resource with a JSON body.
    async fn patch(
        &self,
        device: &Device,
        target: &str,
        body: Vec<u8>,
    ) -> Result<DeviceResponse, ClientError>;
}

/// Redfish client configuration.
#[derive(Debug, Clone)]
pub struct RedfishClientConfig {
    /// Scheme used to reach devices when a target is a bare path
    pub scheme: String,
    /// Optional request deadline; device calls wait indefinitely without one
    pub timeout: Option<Duration>,
    /// CA bundle trusted for device certificates (PEM format)
    pub ca_cert_path: Option<PathBuf>,
}

impl Default for RedfishClientConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            timeout: None,
            ca_cert_path: None,
        }
    }
}

/// [`DeviceClient`] backed by a shared `reqwest` connection pool.
#[derive(Debug, Clone)]
pub struct RedfishClient {
    client: Client,
    config: RedfishClientConfig,
}

impl RedfishClient {
    /// Create a new Redfish client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created, or if the CA
    /// bundle cannot be read or parsed.
    pub fn new(config: RedfishClientConfig) -> Result<Self, ClientError> {
        let mut builder = Client::builder().use_rustls_tls();

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(ca_path) = &config.ca_cert_path {
            let ca_cert = fs::read(ca_path).map_err(|e| {
                ClientError::Init(format!(
                    "failed to read CA certificate {}: {e}",
                    ca_path.display()
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&ca_cert)
                .map_err(|e| ClientError::Init(format!("failed to parse CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
            tracing::debug!(ca_path = %ca_path.display(), "Loaded device CA bundle");
        }

        let client = builder
            .build()
            .map_err(|e| ClientError::Init(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn resolve(&self, device: &Device, target: &str) -> Result<Url, ClientError> {
        match Url::parse(target) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let root = format!("{}://{}", self.config.scheme, device.host);
                let base = Url::parse(&root)
                    .map_err(|e| ClientError::InvalidUrl(format!("{root}: {e}")))?;
                base.join(target)
                    .map_err(|e| ClientError::InvalidUrl(format!("{target}: {e}")))
            }
            Err(e) => Err(ClientError::InvalidUrl(format!("{target}: {e}"))),
        }
    }

    async fn send(
        &self,
        method: Method,
        device: &Device,
        target: &str,
        body: Option<Vec<u8>>,
    ) -> Result<DeviceResponse, ClientError> {
        let url = self.resolve(device, target)?;

        tracing::debug!(%method, %url, host = %device.host, "Device request");

        let mut request = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json")
            .basic_auth(&device.username, Some(device.password_text()));

        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Body(e.to_string()))?
            .to_vec();

        Ok(DeviceResponse {
            status,
            location,
            body,
        })
    }
}

#[async_trait]
impl DeviceClient for RedfishClient {
    async fn get(&self, device: &Device, target: &str) -> Result<DeviceResponse, ClientError> {
        self.send(Method::GET, device, target, None).await
    }

    async fn post(
        &self,
        device: &Device,
        target: &str,
        body: Vec<u8>,
    ) -> Result<DeviceResponse, ClientError> {
        self.send(Method::POST, device, target, Some(body)).await
    }

    async fn delete(&self, device: &Device, target: &str) -> Result<DeviceResponse, ClientError> {
        self.send(Method::DELETE, device, target, None).await
    }

    async fn patch(
        &self,
        device: &Device,
        target: &str,
        body: Vec<u8>,
    ) -> Result<DeviceResponse, ClientError> {
        self.send(Method::PATCH, device, target, Some(body)).await
    }
}

/// Errors that can occur talking to a device.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Client initialization failed
    #[error("client init error: {0}")]
    Init(String),
    /// Target could not be turned into a URL
    #[error("invalid device URL: {0}")]
    InvalidUrl(String),
    /// Device unreachable or TLS handshake failed
    #[error("request error: {0}")]
    Request(String),
    /// Response body could not be read
    #[error("body error: {0}")]
    Body(String),
}
