//! HMAC-SHA256 signing shared by outbound requests and inbound webhooks.
//!
//! The provider authenticates both directions with the same primitive:
//! - Outbound: the digest is computed over the resource identifier (the path
//!   segment following the resource prefix), not over the request body
//! - Inbound: the digest is computed over the raw JSON body of the delivery
//! - Digests travel as lowercase hex in the `X-HMAC-SIGNATURE` header

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex digest, in both directions.
pub const SIGNATURE_HEADER: &str = "x-hmac-signature";

/// Header carrying the public key of the credential that signed an outbound request.
pub const CLIENT_HEADER: &str = "x-auth-client";

/// Sign an arbitrary byte string, returning the lowercase hex digest.
pub fn sign_bytes(message: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Sign a resource identifier for an outbound request.
pub fn sign_id(id: &str, secret: &str) -> String {
    sign_bytes(id.as_bytes(), secret)
}

/// A webhook body, either as received on the wire or already parsed.
#[derive(Debug, Clone)]
pub enum Payload<'a> {
    Raw(&'a [u8]),
    Json(&'a Value),
}

impl Payload<'_> {
    /// Canonical bytes fed to the digest.
    ///
    /// Raw bodies are used as-is. Parsed bodies are serialized compactly in the
    /// order their keys were read, which reproduces the sender's bytes for any
    /// body that was itself compact.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Raw(bytes) => bytes.to_vec(),
            Payload::Json(value) => serde_json::to_vec(value).unwrap_or_default(),
        }
    }
}

/// Sign a webhook payload.
pub fn sign_payload(payload: &Payload<'_>, secret: &str) -> String {
    sign_bytes(&payload.canonical_bytes(), secret)
}

/// Verify a hex signature over a payload with a single secret.
///
/// Hex case and surrounding whitespace are ignored. The digest comparison is
/// constant-time.
pub fn verify_signature(payload: &Payload<'_>, signature: &str, secret: &str) -> bool {
    let Ok(claimed) = hex::decode(signature.trim()) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(&payload.canonical_bytes());
    mac.verify_slice(&claimed).is_ok()
}
