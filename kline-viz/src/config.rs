//! Client configuration
//!
//! Every field can be overridden from the environment via [`ClientConfig::from_env`].

use std::{path::PathBuf, time::Duration};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_BASE_URL: &str = "KLINE_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "KLINE_API_TIMEOUT_SECS";
pub const ENV_TOKEN_PATH: &str = "KLINE_TOKEN_PATH";

/// REST client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend base URL including the `/api` prefix
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Where the session token is persisted between runs (none = in-memory only)
    pub token_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            token_path: None,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with a custom base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Read overrides from the process environment. Unparseable values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            base_url: lookup(ENV_BASE_URL)
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.base_url),
            timeout: lookup(ENV_TIMEOUT_SECS)
                .and_then(|secs| secs.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            token_path: lookup(ENV_TOKEN_PATH)
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Persist the session token at `path`
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = Some(path.into());
        self
    }
}
