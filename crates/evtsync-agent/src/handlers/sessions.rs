//! Session token issue.

use super::bad_request;
use crate::middleware::auth::AUTH_TOKEN_HEADER;
use crate::server::AppState;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;

/// Session request body.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SessionRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// POST `/ODIM/v1/Sessions`: trade plugin credentials for an `X-Auth-Token`.
pub async fn create_session(State(state): State<AppState>, body: Bytes) -> Response {
    let request: SessionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "Failed to decode session request");
            return bad_request();
        }
    };

    if !state
        .credentials
        .matches(&request.username, &request.password)
    {
        tracing::warn!(username = %request.username, "Session refused");
        return (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
    }

    let token = state.tokens.issue();
    tracing::info!(username = %request.username, live_tokens = state.tokens.len(), "Session created");

    let mut response = StatusCode::CREATED.into_response();
    match HeaderValue::from_str(&token) {
        Ok(value) => {
            response.headers_mut().insert(AUTH_TOKEN_HEADER, value);
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "Issued token is not a valid header value");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
