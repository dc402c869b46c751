use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

pub const ENV_API_URL: &str = "DELVE_API_URL";
pub const ENV_API_KEY: &str = "DELVE_API_KEY";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "DELVE_REQUEST_TIMEOUT_MS";

/// Per-request timeout applied to every HTTP call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0} must be set")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("invalid base url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build http client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Connection settings for the research job service.
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            api_key: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Read `DELVE_API_URL` (required), `DELVE_API_KEY` and
    /// `DELVE_REQUEST_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(ENV_API_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ClientError::MissingVar(ENV_API_URL))?;
        let mut config = Self::new(url.trim())?;

        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
            config.api_key = Some(key.trim().to_string());
        }

        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            let ms = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| ClientError::InvalidValue {
                    var: ENV_REQUEST_TIMEOUT_MS,
                    value: raw.clone(),
                })?;
            config.request_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let invalid = |reason: String| ClientError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("not a base url".to_string()));
    }
    Ok(url)
}
