use std::path::{Path, PathBuf};
use std::time::Duration;

use bc_backend::ClientOptions;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable overriding `backend.base_url`.
pub const URL_ENV: &str = "BRIDGECHAT_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub display: DisplayConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Root URL of the agent service.
    pub base_url: String,
    /// Path of the streaming chat endpoint.
    pub chat_path: String,
    /// Path of the tool listing endpoint.
    pub tools_path: String,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between two chunks of a reply.
    pub read_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            chat_path: "/chat".to_string(),
            tools_path: "/tools".to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 300,
        }
    }
}

impl BackendConfig {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.base_url.clone(),
            chat_path: self.chat_path.clone(),
            tools_path: self.tools_path.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Use ANSI colors (NO_COLOR still wins).
    pub color: bool,
    /// Tool results longer than this are cut, with a note of how much was hidden.
    pub max_result_lines: usize,
    /// Tool descriptions in the catalog are cut to this many characters.
    pub description_width: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color: true,
            max_result_lines: 20,
            description_width: 50,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Default tracing filter when neither BRIDGECHAT_LOG nor RUST_LOG is set.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load the config file at the default location, falling back to
    /// defaults when it is missing or invalid.
    pub fn load_or_default() -> Self {
        let path = config_path();
        if !path.exists() {
            return Config::default();
        }
        // Runs before logging is configured, so report on stderr directly.
        Self::load_from(&path).unwrap_or_else(|e| {
            eprintln!("warning: {e}; using defaults");
            Config::default()
        })
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var(URL_ENV) {
            if !url.trim().is_empty() {
                self.backend.base_url = url;
            }
        }
        self
    }
}

pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("bridgechat").join("config.toml")
}
