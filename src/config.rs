//! Configuration management for loadpulse
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Every section except `[target]` is optional and falls back to defaults.
//! The Telegram bot token is never read from the file, only from the
//! `TELEGRAM_BOT_TOKEN` environment variable.

use crate::error::{AppError, AppResult};
use crate::traffic::driver::MAX_CONCURRENCY;
use crate::traffic::executor::{RetryPolicy, Timeouts};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable overriding `notifier.chat_id`
pub const CHAT_ID_ENV: &str = "TELEGRAM_CHAT_ID";

/// Upper bound for connect/read timeouts, in seconds
pub const MAX_TIMEOUT_SECONDS: u64 = 300;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// The web API under test
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    pub base_url: String,
}

/// HTTP client behavior for every outgoing request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
    /// Total attempts per logical request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff; the delay after attempt `k` is `retry_delay_ms * k`
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub propagate_trace_context: bool,
}

impl HttpConfig {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_timeout_seconds),
            read: Duration::from_secs(self.read_timeout_seconds),
        }
    }

    pub fn retry_policy(&self) -> AppResult<RetryPolicy> {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
            .map_err(|e| AppError::Config(e.to_string()))
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: default_connect_timeout(),
            read_timeout_seconds: default_read_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            propagate_trace_context: false,
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

/// Load driver and identifier cache settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoadConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_stored_ids")]
    pub max_stored_ids: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_stored_ids: default_max_stored_ids(),
            page_size: default_page_size(),
        }
    }
}

fn default_max_concurrency() -> usize {
    MAX_CONCURRENCY
}

fn default_max_stored_ids() -> usize {
    100
}

fn default_page_size() -> u32 {
    50
}

/// Observability backends probed by `check` and `detect`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendsConfig {
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,
    #[serde(default = "default_jaeger_url")]
    pub jaeger_url: String,
    /// Jaeger admin port serving its own `/metrics`
    #[serde(default = "default_jaeger_admin_url")]
    pub jaeger_admin_url: String,
    #[serde(default = "default_loki_url")]
    pub loki_url: String,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            prometheus_url: default_prometheus_url(),
            jaeger_url: default_jaeger_url(),
            jaeger_admin_url: default_jaeger_admin_url(),
            loki_url: default_loki_url(),
        }
    }
}

fn default_prometheus_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_jaeger_url() -> String {
    "http://localhost:16686".to_string()
}

fn default_jaeger_admin_url() -> String {
    "http://localhost:14269".to_string()
}

fn default_loki_url() -> String {
    "http://localhost:3100".to_string()
}

/// Alert bot settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl NotifierConfig {
    /// Chat id from `TELEGRAM_CHAT_ID`, falling back to the file
    pub fn resolve_chat_id(&self) -> Option<String> {
        std::env::var(CHAT_ID_ENV)
            .ok()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| self.chat_id.clone())
    }

    pub fn listen_addr(&self) -> AppResult<SocketAddr> {
        self.listen.parse().map_err(|e| {
            AppError::Config(format!(
                "notifier.listen '{}' is not a valid socket address: {}",
                self.listen, e
            ))
        })
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            chat_id: None,
            listen: default_listen(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn validate_url(field: &str, url: &str) -> AppResult<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(AppError::Config(format!(
            "{} '{}' must start with http:// or https://",
            field, url
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Configuration with every default and the given target
    pub fn default_for(base_url: impl Into<String>) -> Self {
        Self {
            target: TargetConfig {
                base_url: base_url.into(),
            },
            http: HttpConfig::default(),
            load: LoadConfig::default(),
            backends: BackendsConfig::default(),
            notifier: NotifierConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }

    /// Validate configuration after parsing
    ///
    /// Called by `from_file()` and `from_str()`; call it explicitly after
    /// building or mutating a `Config` by hand.
    pub fn validate(&self) -> AppResult<()> {
        validate_url("target.base_url", &self.target.base_url)?;

        for (field, value) in [
            ("http.connect_timeout_seconds", self.http.connect_timeout_seconds),
            ("http.read_timeout_seconds", self.http.read_timeout_seconds),
        ] {
            if value == 0 || value > MAX_TIMEOUT_SECONDS {
                return Err(AppError::Config(format!(
                    "{}={} is out of range (must be 1-{} seconds)",
                    field, value, MAX_TIMEOUT_SECONDS
                )));
            }
        }

        if self.http.max_retries == 0 {
            return Err(AppError::Config(
                "http.max_retries must be at least 1 (it counts total attempts)".to_string(),
            ));
        }

        if self.load.max_concurrency == 0 || self.load.max_concurrency > MAX_CONCURRENCY {
            return Err(AppError::Config(format!(
                "load.max_concurrency={} is out of range (must be 1-{})",
                self.load.max_concurrency, MAX_CONCURRENCY
            )));
        }

        if self.load.max_stored_ids == 0 {
            return Err(AppError::Config(
                "load.max_stored_ids must be at least 1".to_string(),
            ));
        }

        if self.load.page_size == 0 {
            return Err(AppError::Config(
                "load.page_size must be at least 1".to_string(),
            ));
        }

        validate_url("backends.prometheus_url", &self.backends.prometheus_url)?;
        validate_url("backends.jaeger_url", &self.backends.jaeger_url)?;
        validate_url("backends.jaeger_admin_url", &self.backends.jaeger_admin_url)?;
        validate_url("backends.loki_url", &self.backends.loki_url)?;
        validate_url("notifier.api_base", &self.notifier.api_base)?;
        self.notifier.listen_addr()?;

        let level = self.observability.log_level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(AppError::Config(format!(
                "observability.log_level '{}' is invalid (expected one of: {})",
                self.observability.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}

/// Commented configuration written by `loadpulse config`
pub const CONFIG_TEMPLATE: &str = r#"# loadpulse configuration

[target]
# Forum API under test
base_url = "http://localhost:8080"

[http]
connect_timeout_seconds = 10
read_timeout_seconds = 30
# Total attempts per request; only connection errors and timeouts are retried
max_retries = 3
# Delay after attempt k is retry_delay_ms * k
retry_delay_ms = 500
# Send a W3C traceparent and x-request-id with every request
propagate_trace_context = false

[load]
# Worker pool cap (1-50); the pool is min(max_concurrency, rps)
max_concurrency = 50
# Identifiers remembered per entity kind
max_stored_ids = 100
page_size = 50

[backends]
prometheus_url = "http://localhost:9090"
jaeger_url = "http://localhost:16686"
jaeger_admin_url = "http://localhost:14269"
loki_url = "http://localhost:3100"

[notifier]
api_base = "https://api.telegram.org"
# TELEGRAM_CHAT_ID overrides this; the bot token is read from TELEGRAM_BOT_TOKEN
# chat_id = "123456789"
listen = "0.0.0.0:8080"

[observability]
log_level = "info"
"#;
