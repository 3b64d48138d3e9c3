//! Server configuration loaded from TOML.

use crate::error::{DevRelError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevRelConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub pagination: PaginationConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty means same-origin only.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            cors_origins: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path, or `:memory:`.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DevRelConfig::data_dir().join("devrel.db").display().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    pub cookie_name: String,
    /// Adds the `Secure` attribute to the session cookie.
    pub secure_cookie: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            session_ttl_hours: 24,
            cookie_name: "drm_session".into(),
            secure_cookie: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl DevRelConfig {
    /// `~/.devrel`
    pub fn data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".devrel")
    }

    pub fn default_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// Load from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DevRelError::Config(format!("Invalid config: {e}")))
    }

    /// Resolve the config path (`DEVREL_CONFIG` or the default), load it if
    /// present, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("DEVREL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        let mut config = if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `DEVREL_*` overrides from the given lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(secret) = lookup("DEVREL_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(path) = lookup("DEVREL_DATABASE") {
            self.database.path = path;
        }
        if let Some(port) = lookup("DEVREL_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| DevRelError::Config(format!("DEVREL_PORT is not a port: {port}")))?;
        }
        Ok(())
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 16 {
            return Err(DevRelError::Config(
                "auth.jwt_secret must be at least 16 characters (set DEVREL_JWT_SECRET)".into(),
            ));
        }
        if self.pagination.max_limit == 0 || self.pagination.default_limit == 0 {
            return Err(DevRelError::Config("pagination limits must be positive".into()));
        }
        if self.pagination.default_limit > self.pagination.max_limit {
            return Err(DevRelError::Config(
                "pagination.default_limit exceeds pagination.max_limit".into(),
            ));
        }
        Ok(())
    }
}
