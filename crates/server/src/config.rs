//! Configuration loading and validation for the media server.
//!
//! All values are read from environment variables at startup. Bootstrap
//! refuses to start if any required variable is missing or invalid.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port the HTTPS listener binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// PEM-encoded certificate chain presented during the handshake. **Required.**
    pub tls_cert_path: String,

    /// PEM-encoded private key matching the certificate. **Required.**
    pub tls_key_path: String,

    /// Directory files are served from. Nothing outside it is ever opened. **Required.**
    pub file_root: String,

    /// Target prefix stripped from GET requests before resolving against `file_root`.
    #[serde(default = "default_download_prefix")]
    pub download_prefix: String,

    /// YAML or JSON file with the recording catalog backing metadata queries.
    #[serde(default)]
    pub catalog_path: Option<String>,

    /// How often (seconds) to reload the catalog file.
    #[serde(default = "default_catalog_refresh_interval")]
    pub catalog_refresh_interval_secs: u64,

    /// Deadline (seconds) for each session phase: handshake, read, write, shutdown.
    #[serde(default = "default_phase_timeout")]
    pub phase_timeout_secs: u64,

    /// Pause (milliseconds) after a failed accept before accepting again.
    #[serde(default = "default_accept_backoff")]
    pub accept_backoff_ms: u64,

    /// Largest request body accepted, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP collector endpoint. Span export is off when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,
}

fn default_bind_address() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    9988
}
fn default_download_prefix() -> String {
    common::protocol::DOWNLOAD_PREFIX.into()
}
fn default_catalog_refresh_interval() -> u64 {
    300
}
fn default_phase_timeout() -> u64 {
    30
}
fn default_accept_backoff() -> u64 {
    400
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns an error if `BIND_ADDRESS` is not an IP address.
    pub fn bind_ip(&self) -> Result<IpAddr> {
        self.bind_address
            .parse()
            .with_context(|| format!("BIND_ADDRESS is not an IP address: {}", self.bind_address))
    }

    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_timeout_secs)
    }

    pub fn accept_backoff(&self) -> Duration {
        Duration::from_millis(self.accept_backoff_ms)
    }

    pub fn catalog_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.catalog_refresh_interval_secs)
    }

    pub fn file_root(&self) -> PathBuf {
        PathBuf::from(&self.file_root)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.tls_cert_path, "TLS_CERT_PATH")?;
        ensure_non_empty(&self.tls_key_path, "TLS_KEY_PATH")?;
        ensure_non_empty(&self.file_root, "FILE_ROOT")?;
        self.bind_ip()?;

        if !self.download_prefix.starts_with('/') {
            anyhow::bail!("DOWNLOAD_PREFIX must start with '/'");
        }
        if self.phase_timeout_secs == 0 {
            anyhow::bail!("PHASE_TIMEOUT_SECS must be > 0");
        }
        if self.catalog_refresh_interval_secs == 0 {
            anyhow::bail!("CATALOG_REFRESH_INTERVAL_SECS must be > 0");
        }
        if self.max_body_bytes == 0 {
            anyhow::bail!("MAX_BODY_BYTES must be > 0");
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
