//! HTTP request handlers.
//!
//! - `subscriptions` - explicit subscribe/unsubscribe on behalf of the aggregator
//! - `startup` - batch reconciliation and inventory updates
//! - `status` - plugin status
//! - `sessions` - session token issue
//! - `events` - device webhook ingress

pub mod events;
pub mod sessions;
pub mod startup;
pub mod status;
pub mod subscriptions;

pub use events::receive_event;
pub use sessions::create_session;
pub use startup::startup;
pub use status::{status, StatusInfo};
pub use subscriptions::{create_subscription, delete_subscription};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Answer for a request body that could not be decoded.
pub(crate) fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "Error: bad request.").into_response()
}
