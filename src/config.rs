use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::runtime::backoff::ReconnectBackoff;
use crate::util::{derive_stream_url, is_local_endpoint_url, parse_bool_flag};

const DEFAULT_API_URL: &str = "http://localhost:8080";
const DEFAULT_RECONNECT_BASE_MS: u64 = 500;
const DEFAULT_RECONNECT_MAX_MS: u64 = 8000;
const DEFAULT_RECONNECT_FACTOR: f64 = 1.6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_url: String,
    pub stream_url: String,
    pub api_key: Option<String>,
    pub require_api_key: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub reconnect_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            stream_url: derive_stream_url(DEFAULT_API_URL).unwrap_or_default(),
            api_key: None,
            require_api_key: false,
            provider: None,
            model: None,
            reconnect_base_ms: DEFAULT_RECONNECT_BASE_MS,
            reconnect_max_ms: DEFAULT_RECONNECT_MAX_MS,
            reconnect_factor: DEFAULT_RECONNECT_FACTOR,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url = std::env::var("RUNSTREAM_API_URL")
            .ok()
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let stream_url = match std::env::var("RUNSTREAM_STREAM_URL").ok().and_then(non_empty) {
            Some(url) => url,
            None => derive_stream_url(&api_url).with_context(|| {
                format!("cannot derive a stream URL from RUNSTREAM_API_URL '{api_url}'")
            })?,
        };
        let require_api_key = std::env::var("RUNSTREAM_REQUIRE_API_KEY")
            .ok()
            .and_then(parse_bool_flag)
            .unwrap_or(false);

        Ok(Self {
            api_url,
            stream_url,
            api_key: std::env::var("RUNSTREAM_API_KEY").ok().and_then(non_empty),
            require_api_key,
            provider: std::env::var("RUNSTREAM_PROVIDER").ok().and_then(non_empty),
            model: std::env::var("RUNSTREAM_MODEL").ok().and_then(non_empty),
            reconnect_base_ms: env_number("RUNSTREAM_RECONNECT_BASE_MS")?
                .unwrap_or(DEFAULT_RECONNECT_BASE_MS),
            reconnect_max_ms: env_number("RUNSTREAM_RECONNECT_MAX_MS")?
                .unwrap_or(DEFAULT_RECONNECT_MAX_MS),
            reconnect_factor: env_number("RUNSTREAM_RECONNECT_FACTOR")?
                .unwrap_or(DEFAULT_RECONNECT_FACTOR),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid RUNSTREAM_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !self.stream_url.starts_with("ws://") && !self.stream_url.starts_with("wss://") {
            bail!(
                "Invalid RUNSTREAM_STREAM_URL '{}': expected ws:// or wss:// URL",
                self.stream_url
            );
        }

        if self.require_api_key && !is_local_endpoint_url(&self.api_url) && self.api_key.is_none()
        {
            bail!(
                "RUNSTREAM_API_KEY must be set for non-local endpoints (url: '{}')",
                self.api_url
            );
        }

        if self.reconnect_base_ms == 0 || self.reconnect_base_ms > self.reconnect_max_ms {
            bail!(
                "Reconnect base delay {}ms must be positive and at most the cap {}ms",
                self.reconnect_base_ms,
                self.reconnect_max_ms
            );
        }

        if !self.reconnect_factor.is_finite() || self.reconnect_factor < 1.0 {
            bail!(
                "Reconnect factor {} must be a finite number >= 1.0",
                self.reconnect_factor
            );
        }

        Ok(())
    }

    pub fn reconnect_backoff(&self) -> ReconnectBackoff {
        ReconnectBackoff::new(
            Duration::from_millis(self.reconnect_base_ms),
            self.reconnect_factor,
            Duration::from_millis(self.reconnect_max_ms),
        )
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.trim().to_string())
    }
}

fn env_number<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name).ok().and_then(non_empty) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Invalid {name} '{raw}'")),
        None => Ok(None),
    }
}
