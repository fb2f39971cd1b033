//! Webhook routes.
//!
//! Every delivery is authenticated against the raw body before it is parsed.
//! Accepted deliveries are answered with `202 Accepted` and synced in the
//! background on the application's task tracker.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use metrics::counter;
use tracing::{Instrument, info, info_span, instrument};

use super::events::{self, WebhookKind};
use crate::AppState;
use crate::errors::{Error, Result};
use crate::upstream::signing::SIGNATURE_HEADER;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhooks/decision", post(decision_webhook))
        .route("/webhooks/address", post(address_webhook))
}

#[instrument(skip_all)]
pub async fn decision_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<StatusCode> {
    accept(&state, WebhookKind::Decision, &headers, &body)
}

#[instrument(skip_all)]
pub async fn address_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<StatusCode> {
    accept(&state, WebhookKind::Address, &headers, &body)
}

fn accept(state: &AppState, kind: WebhookKind, headers: &HeaderMap, body: &[u8]) -> Result<StatusCode> {
    let result = authenticate_and_dispatch(state, kind, headers, body);
    let outcome = match &result {
        Ok(_) => "accepted",
        Err(Error::Unauthenticated { .. }) => "unauthenticated",
        Err(_) => "rejected",
    };
    counter!("idsync_webhooks_total", "kind" => kind.as_str(), "outcome" => outcome).increment(1);
    result
}

fn authenticate_and_dispatch(state: &AppState, kind: WebhookKind, headers: &HeaderMap, body: &[u8]) -> Result<StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| Error::Unauthenticated {
            message: Some(format!("Missing {SIGNATURE_HEADER} header")),
        })?;

    if !state.authenticator.verify_body(signature, body) {
        return Err(Error::Unauthenticated {
            message: Some("Invalid signature".to_string()),
        });
    }

    let id = events::parse(kind, body).map_err(|e| Error::BadRequest { message: e.to_string() })?;
    info!(%kind, %id, "Webhook accepted");

    let sync = state.sync.clone();
    let span = info_span!("webhook_sync", %kind, %id);
    state.tracker.spawn(
        async move {
            // Failures are logged and counted inside the sync; the sender already has its 202
            let _ = match kind {
                WebhookKind::Decision => sync.sync_session(&id).await,
                WebhookKind::Address => sync.sync_address(&id).await,
            };
        }
        .instrument(span),
    );

    Ok(StatusCode::ACCEPTED)
}
