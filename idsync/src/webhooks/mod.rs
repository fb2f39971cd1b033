//! Inbound webhook intake.
//!
//! - [`auth`]: signature verification against every configured credential
//! - [`events`]: event kinds and identifier extraction from delivery payloads
//! - [`handlers`]: axum routes that authenticate, parse, then hand off to sync

pub mod auth;
pub mod events;
pub mod handlers;

pub use auth::WebhookAuthenticator;
pub use events::{EventError, WebhookKind};
pub use handlers::router;
