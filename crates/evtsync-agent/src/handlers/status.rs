//! Plugin status.

use crate::middleware::auth::extract_token;
use crate::server::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Description attached to every advertised queue.
const QUEUE_DESCRIPTION: &str = "Queue for redfish events";

/// Status fields fixed at startup.
#[derive(Debug, Clone)]
pub struct StatusInfo {
    /// Reported plugin version
    pub version: String,
    /// Time the plugin came up (RFC 3339)
    pub uptime: String,
    /// Message bus kind
    pub emb_type: String,
    /// Queues events are published to
    pub queues: Vec<String>,
}

impl StatusInfo {
    /// Status info for a plugin starting now.
    #[must_use]
    pub fn starting_now(
        version: impl Into<String>,
        emb_type: impl Into<String>,
        queues: Vec<String>,
    ) -> Self {
        Self {
            version: version.into(),
            uptime: now(),
            emb_type: emb_type.into(),
            queues,
        }
    }
}

/// Status response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PluginStatusResponse {
    comment: String,
    name: String,
    version: String,
    status: Status,
    event_message_bus: EventMessageBus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Status {
    available: String,
    uptime: String,
    time_stamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct EventMessageBus {
    emb_type: String,
    emb_queue: Vec<EmbQueue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct EmbQueue {
    queue_name: String,
    queue_desc: String,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// GET `/ODIM/v1/Status`. A presented token must be valid.
pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = extract_token(&headers) {
        if !state.tokens.validate(token) {
            tracing::error!("Invalid/Expired X-Auth-Token");
            return (StatusCode::UNAUTHORIZED, "Invalid/Expired X-Auth-Token").into_response();
        }
    }

    let info = &state.status;
    let body = PluginStatusResponse {
        comment: "Plugin Status Response".to_string(),
        name: "Common Redfish Plugin Status".to_string(),
        version: info.version.clone(),
        status: Status {
            available: "yes".to_string(),
            uptime: info.uptime.clone(),
            time_stamp: now(),
        },
        event_message_bus: EventMessageBus {
            emb_type: info.emb_type.clone(),
            emb_queue: info
                .queues
                .iter()
                .map(|queue| EmbQueue {
                    queue_name: queue.clone(),
                    queue_desc: QUEUE_DESCRIPTION.to_string(),
                })
                .collect(),
        },
    };

    (StatusCode::OK, Json(body)).into_response()
}
