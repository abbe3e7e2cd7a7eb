//! Authentication of aggregator requests.
//!
//! A request is accepted with a live `X-Auth-Token` session token or with
//! Basic credentials matching the plugin's configured username and password.
//! A presented token is always checked, even when Basic credentials are
//! also present.

use crate::server::AppState;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Header carrying a session token.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Username and password accepted from the aggregator.
#[derive(Clone, PartialEq, Eq)]
pub struct PluginCredentials {
    /// Expected username
    pub username: String,
    /// Expected password
    pub password: String,
}

impl PluginCredentials {
    /// Create a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Whether the given pair matches.
    #[must_use]
    pub fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

impl std::fmt::Debug for PluginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Extracts the session token, if one was sent.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|token| !token.is_empty())
}

/// Extracts `(username, password)` from a Basic Authorization header.
fn extract_basic(headers: &HeaderMap) -> Option<(String, String)> {
    let encoded = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Errors that can occur authenticating a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// The session token is unknown or idle too long.
    InvalidToken,
    /// Basic credentials did not match.
    InvalidCredentials,
    /// Neither a token nor Basic credentials were sent.
    MissingCredentials,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            Self::InvalidToken => "Invalid/Expired X-Auth-Token",
            Self::InvalidCredentials => "Invalid credentials",
            Self::MissingCredentials => "No valid authorization",
        };

        (StatusCode::UNAUTHORIZED, message).into_response()
    }
}

/// Check the headers of a request against the token store and credentials.
///
/// # Errors
///
/// Returns the reason the request is rejected.
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<(), AuthError> {
    if let Some(token) = extract_token(headers) {
        return if state.tokens.validate(token) {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        };
    }

    let (username, password) = extract_basic(headers).ok_or(AuthError::MissingCredentials)?;
    if state.credentials.matches(&username, &password) {
        Ok(())
    } else {
        Err(AuthError::InvalidCredentials)
    }
}

/// Axum middleware rejecting unauthenticated requests with 401.
pub async fn require_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if let Err(e) = authenticate(&state, req.headers()) {
        tracing::warn!(reason = ?e, path = %req.uri().path(), "Rejected request");
        return Err(e);
    }

    Ok(next.run(req).await)
}
