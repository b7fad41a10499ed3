//! Server configuration
//!
//! Values are layered, later layers winning:
//!
//! 1. built-in defaults
//! 2. a JSON file (`--config` or `GAZETTE_CONFIG`)
//! 3. `GAZETTE_*` environment variables
//! 4. command-line flags
//!
//! [`ServerConfig::validate`] runs once every layer has been applied.

use gazette_cache::ResponseCacheConfig;
use gazette_engine::AccountSettings;
use gazette_query::CostPolicy;
use gazette_security::{HashingParams, TokenSettings};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const ENV_BIND: &str = "GAZETTE_BIND";
pub const ENV_ACCESS_SECRET: &str = "GAZETTE_ACCESS_SECRET";
pub const ENV_REFRESH_SECRET: &str = "GAZETTE_REFRESH_SECRET";
pub const ENV_SINGLE_USE_SECRET: &str = "GAZETTE_SINGLE_USE_SECRET";
pub const ENV_CACHE_ENABLED: &str = "GAZETTE_CACHE_ENABLED";
pub const ENV_CACHE_TTL_SECS: &str = "GAZETTE_CACHE_TTL_SECS";
pub const ENV_MAX_COST: &str = "GAZETTE_MAX_COST";
pub const ENV_MAX_DEPTH: &str = "GAZETTE_MAX_DEPTH";
pub const ENV_RATE_LIMIT: &str = "GAZETTE_RATE_LIMIT";
pub const ENV_LOG: &str = "GAZETTE_LOG";
pub const ENV_LOG_FORMAT: &str = "GAZETTE_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("auth.{0} must not be empty")]
    MissingSecret(&'static str),

    #[error("auth.{0} and auth.{1} must differ")]
    SharedSecret(&'static str, &'static str),

    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("invalid password hashing parameters: {0}")]
    Hashing(String),
}

impl ConfigError {
    fn invalid_env(name: &'static str, value: &str) -> Self {
        Self::InvalidEnv {
            name,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub auth: AuthSection,
    pub cost: CostPolicy,
    pub cache: ResponseCacheConfig,
    pub rate_limit: RateLimitSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: SocketAddr,
    /// Key the rate limiter on the first `X-Forwarded-For` address
    pub trust_forwarded_for: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 4000)),
            trust_forwarded_for: false,
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub access_secret: String,
    pub refresh_secret: String,
    /// Signs email verification and password reset tokens
    pub single_use_secret: String,
    #[serde(flatten)]
    pub tokens: TokenSettings,
    #[serde(flatten)]
    pub accounts: AccountSettings,
    pub hashing: HashingParams,
}

impl fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSection")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("single_use_secret", &"<redacted>")
            .field("tokens", &self.tokens)
            .field("accounts", &self.accounts)
            .field("hashing", &self.hashing)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub enabled: bool,
    /// Requests admitted per caller in each window
    pub requests: u32,
    pub window_secs: u64,
    /// How often stale windows are dropped
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: 120,
            window_secs: 60,
            sweep_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence when set
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

impl ServerConfig {
    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `GAZETTE_*` variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(ENV_BIND) {
            self.server.bind = parse_env(ENV_BIND, &bind)?;
        }
        if let Some(secret) = lookup(ENV_ACCESS_SECRET) {
            self.auth.access_secret = secret;
        }
        if let Some(secret) = lookup(ENV_REFRESH_SECRET) {
            self.auth.refresh_secret = secret;
        }
        if let Some(secret) = lookup(ENV_SINGLE_USE_SECRET) {
            self.auth.single_use_secret = secret;
        }
        if let Some(enabled) = lookup(ENV_CACHE_ENABLED) {
            self.cache.enabled = parse_bool(ENV_CACHE_ENABLED, &enabled)?;
        }
        if let Some(ttl) = lookup(ENV_CACHE_TTL_SECS) {
            self.cache.ttl_secs = parse_env(ENV_CACHE_TTL_SECS, &ttl)?;
        }
        if let Some(max_cost) = lookup(ENV_MAX_COST) {
            self.cost.max_cost = parse_env(ENV_MAX_COST, &max_cost)?;
        }
        if let Some(max_depth) = lookup(ENV_MAX_DEPTH) {
            self.cost.max_depth = parse_env(ENV_MAX_DEPTH, &max_depth)?;
        }
        if let Some(requests) = lookup(ENV_RATE_LIMIT) {
            self.rate_limit.requests = parse_env(ENV_RATE_LIMIT, &requests)?;
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.logging.filter = filter;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = format
                .parse()
                .map_err(|()| ConfigError::invalid_env(ENV_LOG_FORMAT, &format))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let secrets = [
            ("access_secret", &self.auth.access_secret),
            ("refresh_secret", &self.auth.refresh_secret),
            ("single_use_secret", &self.auth.single_use_secret),
        ];
        for (name, secret) in secrets {
            if secret.trim().is_empty() {
                return Err(ConfigError::MissingSecret(name));
            }
        }
        for (i, (first, a)) in secrets.iter().enumerate() {
            for (second, b) in &secrets[i + 1..] {
                if a == b {
                    return Err(ConfigError::SharedSecret(first, second));
                }
            }
        }

        let limits = [
            ("cost.max_cost", self.cost.max_cost),
            ("cost.max_depth", u64::from(self.cost.max_depth)),
            ("auth.access_ttl_secs", self.auth.tokens.access_ttl_secs),
            ("auth.refresh_ttl_secs", self.auth.tokens.refresh_ttl_secs),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(ConfigError::ZeroLimit(name));
            }
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(ConfigError::ZeroLimit("cache.ttl_secs"));
        }
        if self.rate_limit.enabled {
            let window = [
                ("rate_limit.requests", u64::from(self.rate_limit.requests)),
                ("rate_limit.window_secs", self.rate_limit.window_secs),
                ("rate_limit.sweep_interval_secs", self.rate_limit.sweep_interval_secs),
            ];
            for (name, value) in window {
                if value == 0 {
                    return Err(ConfigError::ZeroLimit(name));
                }
            }
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid_env(name, value))
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_env(name, value)),
    }
}
