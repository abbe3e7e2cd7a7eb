//! # Redfish EvtSync Core
//!
//! Shared model for the plugin-side event subscription engine.
//!
//! This crate provides:
//! - Device, subscription, and startup request types in the aggregator's wire format
//! - Ordered substring translation between the canonical and vendor namespaces
//! - A declarative capability negotiation policy for non-conformant devices
//! - The ingestion event handed from webhook ingress to the message bus

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod event;
pub mod model;
pub mod negotiation;
pub mod translation;

pub use event::IngestionEvent;
pub use model::{
    Device, DeviceData, EventSubscriptionInfo, EventSubscriptionRequest, StartupRequest,
    SubscriptionCollection, SubscriptionRecord, SubscriptionState,
};
pub use negotiation::{Feature, NegotiationPolicy};
pub use translation::{parse_rules, AddressTranslator, TranslationError, TranslationRule};
