//! User and project configuration.
//!
//! Configuration is stored in TOML format at `~/.dep/config.toml`.
//!
//! # Examples
//!
//! ```no_run
//! use dep::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! println!("max resolver depth: {}", config.resolver.max_depth);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Filesystem roots for the three store tiers.
    #[serde(default)]
    pub store: StoreConfig,

    /// Dependency resolver tuning.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Network settings shared by HTTP-backed suppliers.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Authentication settings for registry suppliers.
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_system_root")]
    pub system_root: PathBuf,
    #[serde(default = "default_user_root")]
    pub user_root: PathBuf,
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
}

fn default_system_root() -> PathBuf {
    PathBuf::from("/usr/share/dep/store")
}

fn default_user_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dep")
        .join("store")
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".dep-store")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            system_root: default_system_root(),
            user_root: default_user_root(),
            project_root: default_project_root(),
        }
    }
}

/// Dependency resolver tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Maximum dependency depth to prevent runaway recursion.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Show the full derivation tree in conflict errors for debugging.
    #[serde(default)]
    pub verbose_conflicts: bool,

    /// Resolution timeout in seconds (0 = no timeout).
    #[serde(default)]
    pub resolution_timeout_seconds: u64,
}

fn default_max_depth() -> usize {
    100
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            verbose_conflicts: false,
            resolution_timeout_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// HTTP proxy endpoint (also read from `HTTP_PROXY`/`HTTPS_PROXY`).
    pub proxy: Option<String>,
    /// Hosts that bypass the proxy.
    #[serde(default)]
    pub no_proxy: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// API token for registry suppliers that require authentication.
    pub token: Option<String>,
}

impl AuthConfig {
    /// `urpm_`-prefixed tokens use the `Token` scheme; anything else is
    /// treated as a bearer/JWT session token.
    pub fn format_auth_header(token: &str) -> String {
        if token.starts_with("urpm_") {
            format!("Token {token}")
        } else {
            format!("Bearer {token}")
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            resolver: ResolverConfig::default(),
            network: NetworkConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    /// `DEP_CONFIG_DIR` overrides the directory; otherwise
    /// `~/.dep/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(config_dir) = std::env::var("DEP_CONFIG_DIR") {
            return Ok(PathBuf::from(config_dir).join("config.toml"));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Other("could not determine home directory".to_string()))?;
        Ok(home.join(".dep").join("config.toml"))
    }

    /// Loads from the default path, falling back to `Config::default()`
    /// if no file exists. `DEP_TOKEN` overrides `auth.token` when set.
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        let mut config = if !path.exists() {
            Self::default()
        } else {
            let content = fs::read_to_string(&path)?;
            toml::from_str(&content)?
        };

        if let Ok(token) = std::env::var("DEP_TOKEN") {
            if !token.is_empty() {
                config.auth.token = Some(token);
            }
        }
        if let Ok(proxy) = std::env::var("HTTPS_PROXY").or_else(|_| std::env::var("HTTP_PROXY")) {
            if config.network.proxy.is_none() {
                config.network.proxy = Some(proxy);
            }
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_resolver_limits() {
        let config = Config::default();
        assert_eq!(config.resolver.max_depth, 100);
        assert_eq!(config.resolver.resolution_timeout_seconds, 0);
    }

    #[test]
    fn auth_header_distinguishes_token_types() {
        assert_eq!(AuthConfig::format_auth_header("urpm_abc"), "Token urpm_abc");
        assert_eq!(AuthConfig::format_auth_header("jwt.abc"), "Bearer jwt.abc");
    }
}
