//! # Redfish Adapter
//!
//! Southbound side of the plugin: an authenticated HTTP client for device
//! Redfish services and the reconciler that keeps device event
//! subscriptions in line with the aggregator's desired state.
//!
//! ## Ownership
//!
//! A subscription on a device is ours when its `Destination` contains the
//! `{lbHost}:{lbPort}` of this deployment. Any failure to prove that
//! (transport error, non-200, unparsable body) counts as "not ours", so the
//! reconciler never deletes a subscription it cannot attribute.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod ownership;
pub mod reconciler;

pub use client::{ClientError, DeviceClient, DeviceResponse, RedfishClient, RedfishClientConfig};
pub use ownership::OwnershipClassifier;
pub use reconciler::{ReconcileError, ReconcilerConfig, SubscriptionReconciler};
