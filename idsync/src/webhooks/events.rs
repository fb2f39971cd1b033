//! Delivery payloads sent by the provider.

use serde_json::Value;

/// Which kind of delivery arrived, by route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    /// Decision or verification event, identified by `verification.id`
    Decision,
    /// Address verification event, identified by a top-level `id`
    Address,
}

impl WebhookKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookKind::Decision => "decision",
            WebhookKind::Address => "address",
        }
    }

    /// Pull the session (or address) identifier out of a delivery.
    pub fn extract_id(self, payload: &Value) -> Result<String, EventError> {
        let id = match self {
            WebhookKind::Decision => payload.pointer("/verification/id"),
            WebhookKind::Address => payload.get("id"),
        };

        match id {
            Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.trim().to_string()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(EventError::MissingId { kind: self }),
        }
    }
}

impl std::fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{kind} payload carries no identifier")]
    MissingId { kind: WebhookKind },
}

/// Parse a raw delivery and extract its identifier.
pub fn parse(kind: WebhookKind, body: &[u8]) -> Result<String, EventError> {
    let payload: Value = serde_json::from_slice(body)?;
    kind.extract_id(&payload)
}
