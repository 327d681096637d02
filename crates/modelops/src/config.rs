use std::time::Duration;

use crate::error::{ClientError, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(&base_url.into())?;
        Ok(Self { base_url, ..Self::default() })
    }

    /// Reads `API_BASE_URL`, `POLL_INTERVAL_MS` and `REQUEST_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let poll_interval = millis_var("POLL_INTERVAL_MS")?.unwrap_or(DEFAULT_POLL_INTERVAL);
        let request_timeout = millis_var("REQUEST_TIMEOUT_MS")?.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        if poll_interval.is_zero() {
            return Err(ClientError::Config("POLL_INTERVAL_MS must be greater than zero".into()));
        }

        Ok(Self {
            base_url: normalize_base_url(&base_url)?,
            poll_interval,
            request_timeout,
        })
    }

    pub fn with_poll_interval(mut self, every: Duration) -> Self {
        self.poll_interval = every;
        self
    }
}

pub fn normalize_base_url(raw: &str) -> Result<String> {
    let url = raw.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ClientError::Config(format!(
            "base url must start with http:// or https://, got {url:?}"
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn millis_var(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ClientError::Config(format!("{key} must be an integer number of milliseconds"))),
        Err(_) => Ok(None),
    }
}
