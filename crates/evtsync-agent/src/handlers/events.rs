//! Device webhook ingress.

use super::bad_request;
use crate::pipeline::PipelineError;
use crate::server::AppState;
use axum::{
    body::to_bytes,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use evtsync_core::IngestionEvent;
use std::net::SocketAddr;

/// Largest event body accepted.
const MAX_EVENT_SIZE: usize = 10 * 1024 * 1024;

/// Originator of a delivery: first `X-Forwarded-For` hop, else the peer address.
fn originator(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(ToString::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}

/// POST on the configured destination path.
///
/// Answers 200 once the event is queued; publishing happens later and its
/// failures never reach the device.
pub async fn receive_event(State(state): State<AppState>, req: Request) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = originator(req.headers(), peer);

    let body = match to_bytes(req.into_body(), MAX_EVENT_SIZE).await {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, %ip, "Failed to read event body");
            return bad_request();
        }
    };

    if let Err(e) = serde_json::from_slice::<serde_json::Value>(&body) {
        tracing::error!(error = %e, %ip, "Malformed event payload");
        return bad_request();
    }

    let request = state.translator.to_northbound_bytes(&body);
    tracing::debug!(%ip, payload_len = request.len(), "Event received");

    match state.pipeline.submit(IngestionEvent::redfish(ip, request)).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(PipelineError::Stopped) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to queue event");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
