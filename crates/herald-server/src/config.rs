//! Server configuration.
//!
//! Configuration is layered from:
//! - A TOML configuration file (explicit `--config`, or the first default path found)
//! - Environment variables (`HERALD_*`, nested keys separated by `__`)

use crate::handlers::{EVENTS_PATH, HEALTH_PATH};
use anyhow::{bail, Context, Result};
use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

/// Paths searched when no config file is given.
const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "herald.toml",
    "/etc/herald/herald.toml",
    "~/.config/herald/herald.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Channel authorization endpoint.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Request limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Channel authorization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Path of the auth endpoint.
    #[serde(default = "default_auth_path")]
    pub path: String,

    /// Header carrying the caller's user id.
    #[serde(default = "default_user_header")]
    pub user_header: String,

    /// Public application key, prefixed to auth tokens.
    #[serde(default = "default_app_key")]
    pub app_key: String,

    /// Application secret used to sign auth tokens.
    #[serde(default)]
    pub app_secret: String,
}

/// Request limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of arguments per event.
    #[serde(default = "default_max_args")]
    pub max_args: usize,

    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_auth_path() -> String {
    "/pusher/auth".to_string()
}

fn default_user_header() -> String {
    "x-user-id".to_string()
}

fn default_app_key() -> String {
    "herald".to_string()
}

fn default_max_args() -> usize {
    64
}

fn default_max_body_bytes() -> usize {
    64 * 1024 // 64 KB
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth: AuthConfig::default(),
            limits: LimitsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            path: default_auth_path(),
            user_header: default_user_header(),
            app_key: default_app_key(),
            app_secret: String::new(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_args: default_max_args(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the first default path that
    /// exists, with environment overrides applied on top.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be read or parsed, or the
    /// result fails [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => DEFAULT_CONFIG_PATHS
                .iter()
                .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
                .find(|p| p.exists()),
        };

        if let Some(p) = &path {
            info!("Loading configuration from {}", p.display());
        }

        let config = Self::layered(path.as_deref(), None)?;
        config.validate()?;
        Ok(config)
    }

    /// Layer the file at `path` and the environment. `env` replaces the
    /// process environment when given.
    fn layered(path: Option<&Path>, env: Option<config::Map<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder =
                builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }

        builder
            .add_source(
                config::Environment::with_prefix("HERALD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Check settings the router relies on.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth path is not an absolute static path,
    /// collides with a built-in route, or the user header is not a valid
    /// header name.
    pub fn validate(&self) -> Result<()> {
        let path = &self.auth.path;
        if !path.starts_with('/') {
            bail!("auth.path must start with '/': {path:?}");
        }
        if path.contains([':', '*', '{', '}']) {
            bail!("auth.path must not contain route parameters: {path:?}");
        }
        if [HEALTH_PATH, EVENTS_PATH].contains(&path.as_str()) {
            bail!("auth.path collides with a built-in route: {path:?}");
        }

        HeaderName::from_bytes(self.auth.user_header.as_bytes())
            .with_context(|| format!("Invalid auth.user_header: {:?}", self.auth.user_header))?;

        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}
