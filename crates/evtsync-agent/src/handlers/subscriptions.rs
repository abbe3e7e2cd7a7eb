//! Explicit event subscription requests from the aggregator.

use super::bad_request;
use crate::server::AppState;
use axum::{
    extract::State,
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use evtsync_adapter_redfish::{DeviceResponse, ReconcileError};
use evtsync_core::Device;

/// POST `/ODIM/v1/Subscriptions`: subscribe a device.
pub async fn create_subscription(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(device) = decode_device(&body) else {
        return bad_request();
    };

    tracing::info!(host = %device.host, "Creating event subscription");

    match state.reconciler.create_subscription(&device).await {
        Ok(response) => device_response(response),
        Err(e) => reconcile_error(&device, &e),
    }
}

/// DELETE `/ODIM/v1/Subscriptions`: remove the subscription at the device location.
pub async fn delete_subscription(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(device) = decode_device(&body) else {
        return bad_request();
    };

    tracing::info!(host = %device.host, location = %device.location, "Deleting event subscription");

    match state.reconciler.delete_subscription(&device).await {
        Ok(response) => device_response(response),
        Err(e) => reconcile_error(&device, &e),
    }
}

fn decode_device(body: &[u8]) -> Option<Device> {
    match serde_json::from_slice(body) {
        Ok(device) => Some(device),
        Err(e) => {
            tracing::error!(error = %e, "Failed to decode device details");
            None
        }
    }
}

/// Relay a device answer: status, `Location` and body.
fn device_response(response: DeviceResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut reply = (status, response.body).into_response();

    if let Some(location) = response
        .location
        .and_then(|location| HeaderValue::from_str(&location).ok())
    {
        reply.headers_mut().insert(LOCATION, location);
    }

    reply
}

fn reconcile_error(device: &Device, err: &ReconcileError) -> Response {
    tracing::error!(error = %err, host = %device.host, "Subscription request failed");

    match err {
        ReconcileError::Authentication(_) => (
            StatusCode::BAD_REQUEST,
            "Authentication with the device failed",
        )
            .into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
