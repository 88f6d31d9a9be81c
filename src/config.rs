// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Client Configuration
//!
//! Environment variable names and default values for the Modovisa client.
//! Defaults are the constants baked into the client; [`ClientConfig::from_env`]
//! overlays any variables that are set.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `MODOVISA_API_BASE_URL` | Backend API base URL | `https://api.modovisa.com` |
//! | `MODOVISA_REFRESH_AUDIENCE` | `aud` query passed to the refresh endpoint | `user` |
//! | `MODOVISA_REFRESH_THRESHOLD_SECS` | Refresh when the token expires within this window | `60` |
//! | `MODOVISA_PROACTIVE_INTERVAL_SECS` | Proactive refresher tick period | `60` |
//! | `MODOVISA_HTTP_TIMEOUT_SECS` | Per-request HTTP timeout | `15` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::time::Duration;

use url::Url;

use crate::error::ClientError;

/// Environment variable for the backend base URL.
pub const API_BASE_URL_ENV: &str = "MODOVISA_API_BASE_URL";

/// Environment variable for the refresh audience.
pub const REFRESH_AUDIENCE_ENV: &str = "MODOVISA_REFRESH_AUDIENCE";

/// Environment variable for the expiry threshold, in seconds.
pub const REFRESH_THRESHOLD_ENV: &str = "MODOVISA_REFRESH_THRESHOLD_SECS";

/// Environment variable for the proactive refresher interval, in seconds.
pub const PROACTIVE_INTERVAL_ENV: &str = "MODOVISA_PROACTIVE_INTERVAL_SECS";

/// Environment variable for the HTTP request timeout, in seconds.
pub const HTTP_TIMEOUT_ENV: &str = "MODOVISA_HTTP_TIMEOUT_SECS";

/// Environment variable selecting the log formatter.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_API_BASE_URL: &str = "https://api.modovisa.com";
pub const DEFAULT_REFRESH_AUDIENCE: &str = "user";

/// Tokens expiring within this window are refreshed before use.
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(60);

/// Proactive refresher tick period.
pub const DEFAULT_PROACTIVE_INTERVAL: Duration = Duration::from_secs(60);

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Runtime configuration for [`crate::ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub refresh_audience: String,
    pub refresh_threshold: Duration,
    pub proactive_interval: Duration,
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_API_BASE_URL).expect("default base URL is valid"),
            refresh_audience: DEFAULT_REFRESH_AUDIENCE.to_string(),
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            proactive_interval: DEFAULT_PROACTIVE_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Defaults pointed at another base URL (staging, a mock server).
    pub fn with_base_url(base_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            ..Self::default()
        })
    }

    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(base) = get(API_BASE_URL_ENV) {
            config.base_url = parse_base_url(&base)?;
        }
        if let Some(aud) = get(REFRESH_AUDIENCE_ENV) {
            config.refresh_audience = aud;
        }
        if let Some(secs) = get(REFRESH_THRESHOLD_ENV) {
            config.refresh_threshold = parse_secs(REFRESH_THRESHOLD_ENV, &secs)?;
        }
        if let Some(secs) = get(PROACTIVE_INTERVAL_ENV) {
            let interval = parse_secs(PROACTIVE_INTERVAL_ENV, &secs)?;
            if interval.is_zero() {
                return Err(ClientError::Config(format!(
                    "{PROACTIVE_INTERVAL_ENV} must be greater than zero"
                )));
            }
            config.proactive_interval = interval;
        }
        if let Some(secs) = get(HTTP_TIMEOUT_ENV) {
            config.http_timeout = parse_secs(HTTP_TIMEOUT_ENV, &secs)?;
        }

        Ok(config)
    }
}

/// Parse a base URL, normalising it to end in `/` so `Url::join` keeps any
/// path prefix.
fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let normalised = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&normalised)
        .map_err(|e| ClientError::Config(format!("invalid base URL {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ClientError::Config(format!(
            "base URL must be http or https, got {other}"
        ))),
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<Duration, ClientError> {
    raw.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ClientError::Config(format!("{name} must be a whole number of seconds")))
}
