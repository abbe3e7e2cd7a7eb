//! HTTP surfaces of the plugin.
//!
//! Two routers are served on separate listeners:
//! - the northbound plugin API used by the aggregator (`/ODIM/v1/...`)
//! - the webhook listener devices deliver events to
//!
//! Both are wrapped in a `TraceLayer` for request logging.

use crate::handlers::{self, StatusInfo};
use crate::inventory::DeviceInventory;
use crate::middleware::auth::{require_auth, PluginCredentials};
use crate::pipeline::EventPipeline;
use crate::tokens::TokenStore;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use evtsync_adapter_redfish::SubscriptionReconciler;
use evtsync_core::AddressTranslator;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Device subscription engine
    pub reconciler: SubscriptionReconciler,
    /// Canonical/vendor namespace translation
    pub translator: Arc<AddressTranslator>,
    /// Webhook ingestion pipeline
    pub pipeline: Arc<EventPipeline>,
    /// Issued session tokens
    pub tokens: Arc<TokenStore>,
    /// Devices known from startup requests
    pub inventory: Arc<DeviceInventory>,
    /// Credentials accepted from the aggregator
    pub credentials: Arc<PluginCredentials>,
    /// Static part of the status response
    pub status: Arc<StatusInfo>,
}

/// Router for the northbound plugin API.
pub fn plugin_router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/ODIM/v1/Subscriptions",
            post(handlers::create_subscription).delete(handlers::delete_subscription),
        )
        .route("/ODIM/v1/Startup", post(handlers::startup))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/ODIM/v1/Status", get(handlers::status))
        .route("/ODIM/v1/Sessions", post(handlers::create_session))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router for device webhook deliveries on `dest_uri`.
pub fn event_router(state: AppState, dest_uri: &str) -> Router {
    Router::new()
        .route(dest_uri, post(handlers::receive_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve a router until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns error if the listener fails.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await?;

    tracing::info!(%addr, "HTTP server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
