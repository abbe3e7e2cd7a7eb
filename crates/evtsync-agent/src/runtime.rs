//! Agent runtime orchestration.

use crate::bus::{run_event_loop, MqttBus};
use crate::config::AgentConfig;
use crate::handlers::StatusInfo;
use crate::inventory::DeviceInventory;
use crate::middleware::auth::PluginCredentials;
use crate::pipeline::EventPipeline;
use crate::server::{self, AppState};
use crate::tokens::TokenStore;
use anyhow::{Context, Result};
use chrono::Utc;
use evtsync_adapter_redfish::{
    ReconcilerConfig, RedfishClient, RedfishClientConfig, SubscriptionReconciler,
};
use evtsync_core::{AddressTranslator, IngestionEvent, NegotiationPolicy};
use evtsync_proto::{PluginStatusEvent, TopicScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Wait before announcing the plugin, so both listeners are serving.
const STARTUP_GRACE: Duration = Duration::from_secs(3);

/// How often idle session tokens are pruned.
const TOKEN_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// The main agent runtime.
pub struct Agent {
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Run until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns error if any component fails to start or a listener fails.
    pub async fn run(self) -> Result<()> {
        let config = self.config;
        tracing::info!(plugin_id = %config.plugin.id, "Starting agent runtime");

        let shutdown = CancellationToken::new();

        let translator = Arc::new(AddressTranslator::new(
            config.translation.southbound.clone(),
            config.translation.northbound.clone(),
        ));

        let client = RedfishClient::new(RedfishClientConfig {
            timeout: config.device.timeout,
            ca_cert_path: config.device.ca_cert_path.clone(),
            ..Default::default()
        })
        .context("Failed to create Redfish client")?;

        let reconciler = SubscriptionReconciler::new(
            Arc::new(client),
            translator.clone(),
            ReconcilerConfig {
                lb_host: config.load_balancer.host.clone(),
                lb_port: config.load_balancer.port.clone(),
                destination_uri: config.event.dest_uri.clone(),
                policy: NegotiationPolicy::default().with_max_degradations(config.max_degradations),
            },
        );
        tracing::info!(destination = reconciler.destination(), "Event destination");

        let (bus, eventloop) = MqttBus::new(
            &config.bus.mqtt_broker,
            &format!("evtsync-{}-{}", config.plugin.id, Uuid::new_v4()),
            TopicScheme::default(),
            config.bus.queues.clone(),
            config.plugin.id.clone(),
        )
        .context("Failed to create message bus")?;
        // Outlives `shutdown` so workers can publish while the pipeline drains.
        let bus_cancel = CancellationToken::new();
        let bus_loop = tokio::spawn(run_event_loop(eventloop, bus_cancel.clone()));

        let pipeline = Arc::new(
            EventPipeline::new(config.pipeline.capacity, Arc::new(bus))
                .context("Failed to create event pipeline")?,
        );
        pipeline
            .start(config.pipeline.workers)
            .context("Failed to start event pipeline")?;

        let tokens = Arc::new(TokenStore::new(config.session_timeout));
        let sweeper = tokio::spawn(sweep_tokens(tokens.clone(), shutdown.child_token()));

        let state = AppState {
            reconciler,
            translator,
            pipeline: pipeline.clone(),
            tokens,
            inventory: Arc::new(DeviceInventory::new()),
            credentials: Arc::new(PluginCredentials::new(
                config.plugin.username.clone(),
                config.plugin.password.clone(),
            )),
            status: Arc::new(StatusInfo::starting_now(
                config.plugin.firmware_version.clone(),
                "MQTT",
                config.bus.queues.clone(),
            )),
        };

        let plugin_listener =
            TcpListener::bind((config.plugin.host.as_str(), config.plugin.port))
                .await
                .with_context(|| {
                    format!(
                        "Failed to bind plugin API on {}:{}",
                        config.plugin.host, config.plugin.port
                    )
                })?;
        let event_listener = TcpListener::bind((
            config.event.listener_host.as_str(),
            config.event.listener_port,
        ))
        .await
        .with_context(|| {
            format!(
                "Failed to bind event listener on {}:{}",
                config.event.listener_host, config.event.listener_port
            )
        })?;

        let plugin_server = tokio::spawn(server::serve(
            plugin_listener,
            server::plugin_router(state.clone()),
            shutdown.clone(),
        ));
        let event_server = tokio::spawn(server::serve(
            event_listener,
            server::event_router(state, &config.event.dest_uri),
            shutdown.clone(),
        ));

        tokio::spawn(announce_startup(
            pipeline.clone(),
            config.originator().to_string(),
            format!("{}:{}", config.plugin.host, config.plugin.port),
            shutdown.child_token(),
        ));

        let watcher = shutdown.clone();
        tokio::spawn(async move {
            server::shutdown_signal().await;
            watcher.cancel();
        });

        tracing::info!("Agent running, press Ctrl+C to stop");

        let (plugin_result, event_result) = tokio::join!(plugin_server, event_server);
        shutdown.cancel();

        pipeline.stop().await;
        bus_cancel.cancel();
        let _ = tokio::join!(bus_loop, sweeper);

        plugin_result
            .context("Plugin API task failed")?
            .context("Plugin API server failed")?;
        event_result
            .context("Event listener task failed")?
            .context("Event listener failed")?;

        tracing::info!("Agent stopped");
        Ok(())
    }
}

/// Submit the `PluginStartUp` event after the grace period.
async fn announce_startup(
    pipeline: Arc<EventPipeline>,
    originator: String,
    address: String,
    cancel: CancellationToken,
) {
    tokio::select! {
        () = tokio::time::sleep(STARTUP_GRACE) => {}
        () = cancel.cancelled() => return,
    }

    let request = match PluginStatusEvent::started(originator, Utc::now().to_rfc3339()).to_json() {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode startup event");
            return;
        }
    };

    match pipeline
        .submit(IngestionEvent::plugin_startup(address, request))
        .await
    {
        Ok(()) => tracing::info!("Startup event sent"),
        Err(e) => tracing::error!(error = %e, "Failed to send startup event"),
    }
}

/// Prune idle session tokens until cancelled.
async fn sweep_tokens(tokens: Arc<TokenStore>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(TOKEN_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let expired = tokens.expire();
                if expired > 0 {
                    tracing::debug!(expired, "Expired idle session tokens");
                }
            }
            () = cancel.cancelled() => break,
        }
    }
}
