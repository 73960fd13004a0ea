//! Configuration schema, defaults, and layered loading.
//!
//! Precedence: defaults < config file < environment < CLI
use anyhow::{ensure, Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_PREFIX: &str = "FOLDERSHARE_";
const MAX_TIMEOUT_SECS: u64 = 300;

pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "foldershare")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("foldershare.toml"))
}

/// How the local server is published.
///
/// `Local` is the explicit opt-out: no tunnel is spawned and the public URL
/// is the loopback address. It is never chosen automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Localtunnel,
    Cloudflare,
    Local,
}

/// Whether quota walks, listings and path resolution may pass through symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SymlinkPolicy {
    /// Symlinks are skipped in listings and quota, and never traversed by paths.
    #[default]
    Reject,
    /// Symlinks are followed as long as the target stays under the root.
    Follow,
}

/// Address exposure policy for the listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BindScope {
    #[default]
    Loopback,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub bind: BindScope,
    pub max_upload_mb: u64,
    /// Browser origins allowed to call the API. `"*"` allows any origin
    /// without credentials; an empty list disables CORS headers.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8000,
            bind: BindScope::Loopback,
            max_upload_mb: 1024,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl ServerSettings {
    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_upload_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    pub provider: Transport,
    /// Preferred public name; providers without named tunnels ignore it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    /// Override for the provider executable (e.g. an absolute path).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    pub url_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            provider: Transport::Localtunnel,
            subdomain: None,
            program: None,
            url_timeout_secs: 20,
            shutdown_grace_secs: 5,
        }
    }
}

impl TunnelSettings {
    pub fn url_timeout(&self) -> Duration {
        Duration::from_secs(self.url_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareSettings {
    pub symlinks: SymlinkPolicy,
    pub min_password_len: usize,
}

impl Default for ShareSettings {
    fn default() -> Self {
        Self {
            symlinks: SymlinkPolicy::Reject,
            min_password_len: 4,
        }
    }
}

/// Fully resolved application configuration after all layers merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub tunnel: TunnelSettings,
    pub share: ShareSettings,
}

impl AppConfig {
    /// Rejects values that would make the service unusable.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (1..=MAX_TIMEOUT_SECS).contains(&self.tunnel.url_timeout_secs),
            "Invalid config: tunnel.url_timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
        );
        ensure!(
            (1..=MAX_TIMEOUT_SECS).contains(&self.tunnel.shutdown_grace_secs),
            "Invalid config: tunnel.shutdown_grace_secs must be between 1 and {MAX_TIMEOUT_SECS}"
        );
        ensure!(
            self.server.max_upload_mb > 0,
            "Invalid config: server.max_upload_mb must be > 0"
        );
        ensure!(
            self.share.min_password_len >= 1,
            "Invalid config: share.min_password_len must be >= 1"
        );
        let origins = &self.server.cors_origins;
        if origins.iter().any(|o| o == "*") {
            ensure!(
                origins.len() == 1,
                "Invalid config: server.cors_origins cannot mix \"*\" with explicit origins"
            );
        } else {
            for origin in origins {
                ensure!(
                    (origin.starts_with("http://") || origin.starts_with("https://"))
                        && !origin.ends_with('/')
                        && axum::http::HeaderValue::from_str(origin).is_ok(),
                    "Invalid config: server.cors_origins entry {origin:?} must look like https://host[:port]"
                );
            }
        }
        if let Some(name) = &self.tunnel.subdomain {
            ensure!(
                !name.is_empty()
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'),
                "Invalid config: tunnel.subdomain may only contain letters, digits and '-'"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Transport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
}

/// Loads config from defaults/file/env.
pub fn load_config() -> Result<AppConfig> {
    let path = config_path();

    let config: AppConfig = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("Failed to load configuration")?;

    config.validate()?;

    Ok(config)
}

/// Applies runtime overrides to a loaded config.
pub fn apply_overrides(mut config: AppConfig, overrides: &ConfigOverrides) -> AppConfig {
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(provider) = overrides.provider {
        config.tunnel.provider = provider;
    }
    if let Some(subdomain) = &overrides.subdomain {
        config.tunnel.subdomain = Some(subdomain.clone());
    }

    config
}
