//! # idsync: webhook intake and session sync for an identity-verification provider
//!
//! `idsync` receives signed webhook deliveries from an identity-verification provider,
//! pulls everything the provider holds about the referenced session, and files it
//! in a document store: one folder per person, one JSON document per piece of session
//! data, and the captured images and videos alongside.
//!
//! ## Request Flow
//!
//! A delivery to `/webhooks/decision` or `/webhooks/address` is authenticated first:
//! the `X-HMAC-SIGNATURE` header must be an HMAC-SHA256 of the body under one of the
//! configured credential secrets ([`webhooks::WebhookAuthenticator`]). Only then is the
//! body parsed for the session or address id, and the sync is handed to a background
//! task while the sender gets `202 Accepted`.
//!
//! The sync ([`sync::SessionSync`]) fans out to the provider through
//! [`upstream::UpstreamClient`]. Each upstream call is signed over the resource
//! identifier with the active credential. When the provider rejects a credential the
//! client rotates the shared [`upstream::CredentialPool`] and retries, trying each
//! pair at most once per call. Calls for one session are issued concurrently and
//! settle independently ([`aggregate`]), so a missing decision does not stop the
//! person data or media from being filed.
//!
//! ## Configuration
//!
//! See [`config`] for the YAML layout and environment overrides.

pub mod aggregate;
pub mod config;
pub mod errors;
pub mod sync;
pub mod telemetry;
pub mod upload;
pub mod upstream;
pub mod webhooks;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use anyhow::Context;
use axum::{Router, routing::get};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};

pub use config::Config;

use crate::sync::SessionSync;
use crate::upload::DirectoryUploader;
use crate::upstream::{CredentialPool, UpstreamClient};
use crate::webhooks::WebhookAuthenticator;

/// Install the process-wide rustls crypto provider.
///
/// Must run before any HTTP client is built. Safe to call more than once.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Shared state for request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .authenticator(WebhookAuthenticator::new(pool.clone()))
///     .sync(Arc::new(SessionSync::new(client, uploader, "1.0")))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub authenticator: WebhookAuthenticator,
    pub sync: Arc<SessionSync>,
    /// Background syncs spawned by webhook handlers
    #[builder(default)]
    pub tracker: TaskTracker,
}

/// Build the HTTP router.
pub fn build_router(state: &AppState, enable_metrics: bool) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(webhooks::router())
        .with_state(state.clone());

    if enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// The assembled service.
///
/// 1. **Create**: [`Application::new`] validates credentials, builds the upstream
///    client, prepares the document store and builds the router
/// 2. **Serve**: [`Application::serve`] binds and handles requests until shutdown
/// 3. **Shutdown**: stops accepting deliveries, then waits for in-flight syncs
pub struct Application {
    router: Router,
    state: AppState,
    config: Config,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting idsync with configuration: {:#?}", config);

        let pool = Arc::new(CredentialPool::new(config.credentials.clone())?);
        let client = UpstreamClient::new(&config.upstream, pool.clone()).context("Failed to build upstream client")?;

        let uploader = DirectoryUploader::new(&config.storage.root);
        uploader
            .prepare()
            .await
            .with_context(|| format!("Failed to prepare document store at {}", config.storage.root.display()))?;

        let state = AppState::builder()
            .authenticator(WebhookAuthenticator::new(pool))
            .sync(Arc::new(SessionSync::new(
                Arc::new(client),
                Arc::new(uploader),
                config.upstream.registry_version.clone(),
            )))
            .build();
        let router = build_router(&state, config.enable_metrics);

        Ok(Self { router, state, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, AppState) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.state)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("idsync listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!(in_flight = self.state.tracker.len(), "Waiting for in-flight syncs...");
        self.state.tracker.close();
        self.state.tracker.wait().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test;
