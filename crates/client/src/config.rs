//! Configuration loading and validation for the media client.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Host name or address of the media server. **Required.**
    pub server_host: String,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// PEM file with the root certificate(s) the server chain must verify against. **Required.**
    pub root_ca_path: String,

    /// Name checked against the server certificate. Defaults to `server_host`.
    #[serde(default)]
    pub server_name: Option<String>,

    /// Deadline (seconds) for each step of a request.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Tracing log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_server_port() -> u16 {
    9988
}
fn default_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build client configuration")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise client configuration")?;

        c.validate()?;
        Ok(c)
    }

    pub fn server_name(&self) -> &str {
        self.server_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.server_host)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.server_host.trim().is_empty() {
            anyhow::bail!("SERVER_HOST is required and must not be empty");
        }
        if self.root_ca_path.trim().is_empty() {
            anyhow::bail!("ROOT_CA_PATH is required and must not be empty");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("TIMEOUT_SECS must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            server_host: "media.internal".into(),
            server_port: default_server_port(),
            root_ca_path: "/etc/media/root.pem".into(),
            server_name: None,
            timeout_secs: default_timeout(),
            log_level: default_log_level(),
        }
    }

    #[test]
    fn defaults() {
        assert_eq!(default_server_port(), 9988);
        assert_eq!(default_timeout(), 30);
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn validate_accepts_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_host() {
        let cfg = Config {
            server_host: " ".into(),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_root_ca() {
        let cfg = Config {
            root_ca_path: String::new(),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let cfg = Config {
            timeout_secs: 0,
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn server_name_defaults_to_host() {
        assert_eq!(valid().server_name(), "media.internal");
        let cfg = Config {
            server_name: Some("media.example.com".into()),
            ..valid()
        };
        assert_eq!(cfg.server_name(), "media.example.com");
    }
}
