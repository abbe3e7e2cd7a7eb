//! Capability negotiation for event subscriptions.
//!
//! Some devices reject subscription requests that carry optional filters.
//! A [`NegotiationPolicy`] lists the feature sets to try, richest first;
//! each rejection degrades to the next set until the configured bound on
//! degradation steps is reached.

use crate::model::EventSubscriptionRequest;
use serde::{Deserialize, Serialize};

/// Optional subscription filters a device may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// `MessageIds` filter
    MessageIds,
    /// `ResourceTypes` filter
    ResourceTypes,
}

/// Ordered feature sets to attempt, bounded by a maximum number of degradations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationPolicy {
    attempts: Vec<Vec<Feature>>,
    max_degradations: usize,
}

impl Default for NegotiationPolicy {
    /// Try with `MessageIds`, then once without.
    fn default() -> Self {
        Self {
            attempts: vec![vec![Feature::MessageIds], Vec::new()],
            max_degradations: 1,
        }
    }
}

impl NegotiationPolicy {
    /// Create a policy from a full feature set and its reductions.
    #[must_use]
    pub fn new(full: Vec<Feature>, reduced: Vec<Vec<Feature>>, max_degradations: usize) -> Self {
        let mut attempts = Vec::with_capacity(reduced.len() + 1);
        attempts.push(full);
        attempts.extend(reduced);
        Self {
            attempts,
            max_degradations,
        }
    }

    /// Replace the degradation bound.
    #[must_use]
    pub fn with_max_degradations(mut self, max_degradations: usize) -> Self {
        self.max_degradations = max_degradations;
        self
    }

    /// Number of requests a fully rejecting device will see.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.attempts.len().min(self.max_degradations + 1)
    }

    /// Feature sets in the order they are attempted.
    pub fn feature_sets(&self) -> impl Iterator<Item = &[Feature]> {
        self.attempts
            .iter()
            .take(self.attempt_count())
            .map(Vec::as_slice)
    }
}

impl EventSubscriptionRequest {
    /// Copy of this request carrying only the given optional filters.
    #[must_use]
    pub fn with_features(&self, features: &[Feature]) -> Self {
        let mut shaped = self.clone();
        if !features.contains(&Feature::MessageIds) {
            shaped.message_ids.clear();
        }
        if !features.contains(&Feature::ResourceTypes) {
            shaped.resource_types.clear();
        }
        shaped
    }
}
