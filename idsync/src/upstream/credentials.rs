//! Credential pairs and the rotating pool shared by every upstream call.
//!
//! The pool never disables a pair. A pair that failed becomes eligible again after
//! a full rotation cycle, so a permanently revoked key keeps one slot in every
//! future exhaustion cycle.

use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A public key and the secret it signs with.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialPair {
    pub public_key: String,
    pub shared_secret: String,
}

impl CredentialPair {
    pub fn new(public_key: impl Into<String>, shared_secret: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            shared_secret: shared_secret.into(),
        }
    }
}

// Secrets must never reach logs, including `{:?}` of the config.
impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("public_key", &self.public_key)
            .field("shared_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("credential pool requires at least one credential pair")]
pub struct EmptyPool;

/// Ordered, non-empty set of credential pairs with a single active cursor.
#[derive(Debug)]
pub struct CredentialPool {
    pairs: Vec<CredentialPair>,
    active: AtomicUsize,
}

impl CredentialPool {
    pub fn new(pairs: Vec<CredentialPair>) -> Result<Self, EmptyPool> {
        if pairs.is_empty() {
            return Err(EmptyPool);
        }
        Ok(Self {
            pairs,
            active: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Always false: construction rejects an empty list.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Every configured pair, in configuration order, regardless of the cursor.
    pub fn pairs(&self) -> &[CredentialPair] {
        &self.pairs
    }

    pub fn active_index(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// The currently active pair.
    pub fn current(&self) -> &CredentialPair {
        self.snapshot().1
    }

    /// The active index together with its pair, read from a single load of the cursor.
    pub fn snapshot(&self) -> (usize, &CredentialPair) {
        let index = self.active_index();
        (index, &self.pairs[index])
    }

    /// Advance the cursor by exactly one position, wrapping past the last pair.
    ///
    /// Not idempotent: two calls move two positions.
    pub fn rotate(&self) {
        let len = self.pairs.len();
        // The closure always returns Some, so fetch_update cannot fail.
        let previous = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |index| Some((index + 1) % len))
            .unwrap_or_else(|index| index);
        tracing::debug!(from = previous, to = (previous + 1) % len, "Rotated active credential");
    }
}
