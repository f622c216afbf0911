//! Configuration management
//!
//! Settings are read once at startup from an optional TOML file and then
//! overlaid with environment variables. The resulting [`Config`] is handed to
//! the analyzer and the web layer; nothing reads the environment afterwards.

use crate::error::ConfigError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Model used when neither the config file nor `GEMINI_MODEL` names one
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Public Gemini REST endpoint
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Completion API settings
    pub ai: AiConfig,
    /// HTTP server settings
    pub server: ServerConfig,
}

/// Which completion backend serves analysis requests
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Google Gemini `generateContent`
    #[default]
    Gemini,
    /// Canned offline replies, for demos and local development
    Mock,
}

/// Completion API settings
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AiConfig {
    pub backend: BackendKind,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Per-request timeout; `None` leaves the HTTP client default in place
    pub timeout_seconds: Option<u64>,
    /// Reject completions that do not match the report shape
    pub strict_schema: bool,
}

/// HTTP server settings
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Secret used to sign flash cookies; random per process when unset
    pub secret_key: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Gemini,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: None,
            strict_schema: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            secret_key: None,
        }
    }
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("backend", &self.backend)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("strict_schema", &self.strict_schema)
            .finish()
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl AiConfig {
    /// The configured credential, treating blank values as absent
    pub fn credential(&self) -> Option<&str> {
        non_blank(self.api_key.as_deref())
    }
}

impl ServerConfig {
    /// Address string suitable for `TcpListener::bind`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The configured signing secret, treating blank values as absent
    pub fn session_secret(&self) -> Option<&str> {
        non_blank(self.secret_key.as_deref())
    }
}

impl Config {
    /// Read and validate a TOML configuration file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read,
    /// `ConfigError::TomlError` if it is not valid TOML for this schema and
    /// `ConfigError::ValidationError` if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file or use defaults
    ///
    /// A missing file is not an error: the defaults are used with a warning.
    /// An invalid file is reported and the defaults are used as well, so the
    /// form stays reachable while the operator fixes the file.
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                match Self::from_file(path) {
                    Ok(config) => config,
                    Err(ConfigError::ReadError(e)) => {
                        warn!("Configuration file not found or unreadable ({}), using defaults", e);
                        Self::default()
                    }
                    Err(e) => {
                        log::error!("Configuration error in '{}': {}", path.display(), e);
                        warn!("Using default configuration due to invalid config file");
                        Self::default()
                    }
                }
            }
            None => {
                info!("Using default configuration");
                Self::default()
            }
        }
    }

    /// Overlay values from the process environment
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from an environment lookup
    ///
    /// Recognised variables: `GOOGLE_API_KEY`, `GEMINI_MODEL`,
    /// `GEMINI_BASE_URL`, `SECRET_KEY`, `HOST`, `PORT`. Unset variables leave
    /// the current value untouched.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GOOGLE_API_KEY") {
            self.ai.api_key = Some(key);
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.ai.model = model;
        }
        if let Some(base_url) = lookup("GEMINI_BASE_URL") {
            self.ai.base_url = base_url;
        }
        if let Some(secret) = lookup("SECRET_KEY") {
            self.server.secret_key = Some(secret);
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| ConfigError::ParseError(format!("PORT '{}': {}", port, e)))?;
        }

        self.validate()
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ai.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "ai.model must not be empty".to_string(),
            ));
        }

        if !(self.ai.base_url.starts_with("http://") || self.ai.base_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "ai.base_url must be an http(s) URL, got '{}'",
                self.ai.base_url
            )));
        }

        if self.ai.timeout_seconds == Some(0) {
            return Err(ConfigError::ValidationError(
                "ai.timeout_seconds must be greater than zero".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
