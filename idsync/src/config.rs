//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `IDSYNC_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `IDSYNC_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `IDSYNC_UPSTREAM__BASE_URL=https://verification.example.com` sets `upstream.base_url`.
//!
//! ## Example
//!
//! ```yaml
//! port: 3000
//! upstream:
//!   base_url: https://verification.example.com
//!   api_version: v1
//!   request_timeout: 30s
//! credentials:
//!   - public_key: 7e3b...
//!     shared_secret: c1a0...
//!   - public_key: 91fd...
//!     shared_secret: 04be...
//! storage:
//!   root: /var/lib/idsync/sessions
//! ```
//!
//! The upstream base URL and at least one credential pair are required. A process without
//! them refuses to start.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;
use crate::upstream::CredentialPair;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "IDSYNC_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTP server port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Verification provider API
    pub upstream: UpstreamConfig,
    /// Ordered credential pairs; the first is active at startup
    pub credentials: Vec<CredentialPair>,
    /// Where synced sessions are written
    #[serde(default)]
    pub storage: StorageConfig,
    /// Expose Prometheus metrics at `/internal/metrics`
    #[serde(default)]
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    #[serde(default)]
    pub enable_otel_export: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Provider base URL, without the API version
    pub base_url: Url,
    /// Path segment inserted between the base URL and every resource path
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Version passed to registry checks when syncing sessions
    #[serde(default = "default_registry_version")]
    pub registry_version: String,
    /// Bounded per-call timeout; expiry counts as a transport fault
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory of the document store
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("sessions"),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_registry_version() -> String {
    "1.0".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.credentials.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: at least one credential pair is required under `credentials`".to_string(),
            });
        }

        for (index, pair) in self.credentials.iter().enumerate() {
            if pair.public_key.trim().is_empty() || pair.shared_secret.is_empty() {
                return Err(Error::Internal {
                    operation: format!("Config validation: credential {index} must have a non-empty public_key and shared_secret"),
                });
            }
        }

        if self.upstream.base_url.cannot_be_a_base() {
            return Err(Error::Internal {
                operation: format!("Config validation: upstream.base_url {} is not a valid base URL", self.upstream.base_url),
            });
        }

        let api_version = self.upstream.api_version.trim();
        if api_version.is_empty() || api_version.contains('/') {
            return Err(Error::Internal {
                operation: "Config validation: upstream.api_version must be a single non-empty path segment".to_string(),
            });
        }

        if self.upstream.request_timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: upstream.request_timeout must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can override specific values
            .merge(Env::prefixed("IDSYNC_").split("__").ignore(&["config"]))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
