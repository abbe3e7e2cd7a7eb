//! Session tokens issued to the aggregator.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Concurrent store of `X-Auth-Token` values and their last use.
#[derive(Debug)]
pub struct TokenStore {
    tokens: DashMap<String, Instant>,
    idle_timeout: Duration,
}

impl TokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            tokens: DashMap::new(),
            idle_timeout,
        }
    }

    /// Issue a fresh token.
    pub fn issue(&self) -> String {
        let token = Uuid::new_v4().to_string();
        self.insert(token.clone());
        token
    }

    /// Register a token as used now.
    pub fn insert(&self, token: String) {
        self.tokens.insert(token, Instant::now());
    }

    /// Check a token and refresh its last use.
    ///
    /// An idle token is removed and rejected.
    pub fn validate(&self, token: &str) -> bool {
        let Some(mut last_used) = self.tokens.get_mut(token) else {
            return false;
        };
        if last_used.elapsed() > self.idle_timeout {
            drop(last_used);
            self.tokens.remove(token);
            return false;
        }
        *last_used = Instant::now();
        true
    }

    /// Drop every idle token, returning how many were removed.
    pub fn expire(&self) -> usize {
        let before = self.tokens.len();
        let timeout = self.idle_timeout;
        self.tokens
            .retain(|_, last_used| last_used.elapsed() <= timeout);
        before.saturating_sub(self.tokens.len())
    }

    /// Number of live tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no token is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates() {
        let store = TokenStore::new(Duration::from_secs(60));
        let token = store.issue();

        assert!(store.validate(&token));
        assert!(!store.validate("unknown"));
    }

    #[test]
    fn idle_token_is_rejected_and_removed() {
        let store = TokenStore::new(Duration::ZERO);
        let token = store.issue();
        std::thread::sleep(Duration::from_millis(5));

        assert!(!store.validate(&token));
        assert!(store.is_empty());
    }

    #[test]
    fn expire_prunes_only_idle_tokens() {
        let store = TokenStore::new(Duration::from_millis(50));
        store.insert("old".to_string());
        std::thread::sleep(Duration::from_millis(80));
        store.insert("fresh".to_string());

        assert_eq!(store.expire(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.validate("fresh"));
    }
}
