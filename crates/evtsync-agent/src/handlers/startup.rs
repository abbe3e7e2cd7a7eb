//! Startup requests: inventory update and optional subscription resync.

use super::bad_request;
use crate::server::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use evtsync_core::StartupRequest;
use std::collections::HashMap;

/// POST `/ODIM/v1/Startup`.
///
/// Answers `host -> subscription location` for every reconciled device,
/// or 500 with the first device error.
pub async fn startup(State(state): State<AppState>, body: Bytes) -> Response {
    let request: StartupRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "Failed to decode startup request");
            return bad_request();
        }
    };

    if request.devices.is_empty() {
        tracing::info!("Startup devices list is empty");
        return StatusCode::OK.into_response();
    }

    for (uuid, device) in &request.devices {
        state.inventory.apply(uuid, device);
    }

    let resync = request.wants_resync();
    tracing::info!(
        devices = request.devices.len(),
        request_type = %request.request_type,
        resync,
        "Processing startup request"
    );

    if !resync {
        return (StatusCode::OK, Json(HashMap::<String, String>::new())).into_response();
    }

    match state
        .reconciler
        .reconcile_startup(request.devices.into_values())
        .await
    {
        Ok(locations) => (StatusCode::OK, Json(locations)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Startup reconciliation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
