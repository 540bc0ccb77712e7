//! Client configuration

use crate::error::{ClientError, Result};
use crate::token::REFRESH_WINDOW_MINUTES;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Configuration for the storefront session client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, e.g. `http://localhost:8080/api` (no trailing slash needed)
    pub api_base_url: String,

    /// Deadline applied to every request issued by the orchestrator
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// How often the auto-refresh task inspects the access token
    /// Default: 60 seconds
    pub refresh_check_interval: Duration,

    /// Refresh when this many minutes (or fewer) remain on the access token
    /// Default: 10 minutes
    pub refresh_window_minutes: i64,

    /// Directory backing the file store; `None` keeps sessions in memory
    pub storage_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(api_base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            request_timeout,
            ..Self::default()
        }
    }

    /// Build a config from `STOREFRONT_*` environment variables, falling back
    /// to defaults for anything unset
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("STOREFRONT_API_URL") {
            config.api_base_url = url;
        }
        if let Some(secs) = env_secs("STOREFRONT_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_secs("STOREFRONT_REFRESH_CHECK_SECS")? {
            config.refresh_check_interval = Duration::from_secs(secs);
        }
        if let Ok(dir) = std::env::var("STOREFRONT_STORAGE_DIR") {
            config.storage_dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            return Err(ClientError::Configuration(format!(
                "API base URL must be http(s): {}",
                self.api_base_url
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::Configuration("request timeout must be non-zero".into()));
        }
        if self.refresh_window_minutes <= 0 {
            return Err(ClientError::Configuration("refresh window must be positive".into()));
        }
        Ok(())
    }

    /// Absolute URL for an API path such as `/auth/login`
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            refresh_check_interval: Duration::from_secs(60),
            refresh_window_minutes: REFRESH_WINDOW_MINUTES,
            storage_dir: None,
        }
    }
}

fn env_secs(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ClientError::Configuration(format!("{name}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}
