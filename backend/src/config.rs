//! Configuration management.

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = ".yapi-mcp.toml";

/// Name of the dotenv file read from the current directory.
pub const DOTENV_FILE: &str = ".env";

/// Errors raised while assembling the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration value {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to load configuration: {0}")]
    Figment(#[from] figment::Error),

    #[error("Failed to read .env: {0}")]
    Dotenv(#[from] dotenvy::Error),
}

/// Load `.env` from the current directory into the process environment.
///
/// Variables that are already set win over the file. Returns the path that
/// was loaded, if any.
pub fn load_dotenv() -> Result<Option<PathBuf>, ConfigError> {
    let Ok(dir) = env::current_dir() else {
        return Ok(None);
    };
    let path = dir.join(DOTENV_FILE);
    if !path.exists() {
        return Ok(None);
    }
    dotenvy::from_path(&path)?;
    Ok(Some(path))
}

/// Configuration structure that matches the TOML file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    yapi: YapiConfigFile,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_keep_alive_ms")]
    keep_alive_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            keep_alive_ms: default_keep_alive_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct YapiConfigFile {
    base_url: Option<String>,
    token: Option<String>,
    project_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LoggingConfig {
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    log_file: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    log_level: Option<String>,
}

fn default_port() -> u16 {
    yapi_mcp_types::DEFAULT_PORT
}

fn default_keep_alive_ms() -> u64 {
    yapi_mcp_types::DEFAULT_KEEP_ALIVE_MS
}

/// Environment variables and the config keys they override.
///
/// Read verbatim rather than through `figment::providers::Env` so that
/// numeric-looking tokens and project ids keep their exact spelling.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("YAPI_MCP_KEEP_ALIVE_MS", "server.keep_alive_ms"),
    ("YAPI_BASE_URL", "yapi.base_url"),
    ("YAPI_TOKEN", "yapi.token"),
    ("YAPI_PROJECT_ID", "yapi.project_id"),
    ("YAPI_MCP_LOG_LEVEL", "logging.log_level"),
    ("YAPI_MCP_LOG_FILE", "logging.log_file"),
];

/// Connection settings for the upstream YAPI server.
#[derive(Clone, PartialEq, Eq)]
pub struct YapiSettings {
    /// Base URL of the YAPI server, without trailing slash.
    pub base_url: String,
    /// Project token.
    pub token: String,
    /// Project identifier.
    pub project_id: String,
}

impl YapiSettings {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            project_id: project_id.into(),
        }
    }
}

// Keep the token out of logs.
impl fmt::Debug for YapiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YapiSettings")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// Interval between SSE keep-alive comments
    pub keep_alive: Duration,
    /// Upstream YAPI connection
    pub yapi: YapiSettings,
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    pub log_file: Option<PathBuf>,
    /// Log level (if set, overrides the default when RUST_LOG is absent)
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with full priority chain: CLI args > env vars > config files > defaults.
    ///
    /// Config files are searched in this order:
    /// 1. `config.toml` in the user config directory (~/.config/yapi-mcp/ on Linux)
    /// 2. `.yapi-mcp.toml` in current directory
    /// 3. `config_path`, if given (must exist)
    pub fn from_figment(
        config_path: Option<PathBuf>,
        port: Option<u16>,
        keep_alive_ms: Option<u64>,
    ) -> Result<Self, ConfigError> {
        let user_config = directories::ProjectDirs::from("", "", "yapi-mcp")
            .map(|dirs| dirs.config_dir().join("config.toml"));
        let local_config = env::current_dir().ok().map(|d| d.join(LOCAL_CONFIG_FILE));

        // 1. Defaults
        let mut figment = Figment::new().merge(Serialized::defaults(ConfigFile::default()));

        // 2. Config files, least specific first
        for path in [user_config, local_config].into_iter().flatten() {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::Invalid(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        // 3. Environment variables
        for (var, key) in ENV_OVERRIDES {
            if let Ok(value) = env::var(var) {
                if value.is_empty() {
                    continue;
                }
                figment = match *key {
                    "server.port" => {
                        let port: u16 = value
                            .parse()
                            .map_err(|_| ConfigError::Invalid(format!("{var}={value}")))?;
                        figment.merge(Serialized::default(key, port))
                    }
                    "server.keep_alive_ms" => {
                        let ms: u64 = value
                            .parse()
                            .map_err(|_| ConfigError::Invalid(format!("{var}={value}")))?;
                        figment.merge(Serialized::default(key, ms))
                    }
                    _ => figment.merge(Serialized::default(key, value)),
                };
            }
        }

        // 4. CLI arguments (highest priority)
        if let Some(p) = port {
            figment = figment.merge(Serialized::default("server.port", p));
        }
        if let Some(ms) = keep_alive_ms {
            figment = figment.merge(Serialized::default("server.keep_alive_ms", ms));
        }

        let config_file: ConfigFile = figment.extract()?;
        Self::from_file(config_file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let base_url = required(file.yapi.base_url, "YAPI_BASE_URL")?;
        let token = required(file.yapi.token, "YAPI_TOKEN")?;
        let project_id = required(file.yapi.project_id, "YAPI_PROJECT_ID")?;

        if file.server.keep_alive_ms == 0 {
            return Err(ConfigError::Invalid(
                "keep-alive interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            port: file.server.port,
            keep_alive: Duration::from_millis(file.server.keep_alive_ms),
            yapi: YapiSettings::new(base_url, token, project_id),
            log_file: file.logging.log_file,
            log_level: file.logging.log_level,
        })
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}
