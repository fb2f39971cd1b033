use std::sync::Arc;

use tracing::debug;

use crate::upstream::CredentialPool;
use crate::upstream::signing::{Payload, verify_signature};

/// Checks inbound deliveries against the credential pool.
///
/// The provider may sign with any configured credential, so every pair is
/// tried regardless of which one is active for outbound calls.
#[derive(Debug, Clone)]
pub struct WebhookAuthenticator {
    pool: Arc<CredentialPool>,
}

impl WebhookAuthenticator {
    pub fn new(pool: Arc<CredentialPool>) -> Self {
        Self { pool }
    }

    /// True if any credential in the pool produces `signature` over `payload`.
    pub fn verify(&self, signature: &str, payload: &Payload<'_>) -> bool {
        // Fold over all pairs so the time taken does not reveal which one matched
        let matched = self
            .pool
            .pairs()
            .iter()
            .fold(false, |matched, pair| verify_signature(payload, signature, &pair.shared_secret) | matched);

        if !matched {
            debug!(pairs = self.pool.len(), "Signature matched no credential");
        }
        matched
    }

    /// Verify a body as received, falling back to its compact JSON form.
    ///
    /// Senders that pretty-print their deliveries sign the compact serialization
    /// instead of the bytes on the wire.
    pub fn verify_body(&self, signature: &str, body: &[u8]) -> bool {
        if self.verify(signature, &Payload::Raw(body)) {
            return true;
        }
        match serde_json::from_slice(body) {
            Ok(value) => self.verify(signature, &Payload::Json(&value)),
            Err(_) => false,
        }
    }
}
