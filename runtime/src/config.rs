//! Configuration for the checkout runtime
//!
//! Loaded from environment variables; every variable except the API base URL
//! has a default.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use voyage_checkout_core::confirmation::PollPolicy;

/// Primary API base URL (required)
pub const API_BASE_URL: &str = "CHECKOUT_API_BASE_URL";
/// Fallback API base URL for confirmation checks; fallback disabled when unset
pub const FALLBACK_API_BASE_URL: &str = "CHECKOUT_FALLBACK_API_BASE_URL";
/// Per-request timeout in seconds (default 30)
pub const REQUEST_TIMEOUT_SECS: &str = "CHECKOUT_REQUEST_TIMEOUT_SECS";
/// Confirmation attempts per host (default 3)
pub const POLL_MAX_ATTEMPTS: &str = "CHECKOUT_POLL_MAX_ATTEMPTS";
/// Back-off between confirmation attempts in milliseconds (default 2000)
pub const POLL_BACKOFF_MS: &str = "CHECKOUT_POLL_BACKOFF_MS";
/// File persisting processed booking ids; in-memory when unset
pub const PROCESSED_STORE_PATH: &str = "CHECKOUT_PROCESSED_STORE_PATH";
/// Bearer token sent with every request
pub const API_TOKEN: &str = "CHECKOUT_API_TOKEN";

/// Configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed
    #[error("Invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Offending value
        value: String,
    },
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Primary API base URL, without trailing slash
    pub api_base_url: String,
    /// Alternate host for confirmation checks
    pub fallback_api_base_url: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Confirmation attempts per host
    pub poll_max_attempts: u32,
    /// Back-off between confirmation attempts
    pub poll_backoff: Duration,
    /// Where processed booking ids are persisted
    pub processed_store_path: Option<PathBuf>,
    /// Bearer token
    pub api_token: Option<String>,
}

impl CheckoutConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the base URL is missing or a numeric
    /// variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`
    ///
    /// Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Same as [`CheckoutConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let number = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            get(key).map_or(Ok(default), |value| {
                value
                    .parse()
                    .map_err(|_| ConfigError::Invalid { key, value })
            })
        };

        let api_base_url = get(API_BASE_URL)
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or(ConfigError::Missing(API_BASE_URL))?;
        let poll_max_attempts = u32::try_from(number(POLL_MAX_ATTEMPTS, 3)?)
            .ok()
            .filter(|attempts| *attempts > 0)
            .ok_or_else(|| ConfigError::Invalid {
                key: POLL_MAX_ATTEMPTS,
                value: get(POLL_MAX_ATTEMPTS).unwrap_or_default(),
            })?;

        Ok(Self {
            api_base_url,
            fallback_api_base_url: get(FALLBACK_API_BASE_URL)
                .map(|url| url.trim_end_matches('/').to_string()),
            request_timeout: Duration::from_secs(number(REQUEST_TIMEOUT_SECS, 30)?),
            poll_max_attempts,
            poll_backoff: Duration::from_millis(number(POLL_BACKOFF_MS, 2000)?),
            processed_store_path: get(PROCESSED_STORE_PATH).map(PathBuf::from),
            api_token: get(API_TOKEN),
        })
    }

    /// Confirmation poll policy; the fallback host is only tried when configured
    #[must_use]
    pub const fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            max_attempts_per_host: self.poll_max_attempts,
            backoff: self.poll_backoff,
            fallback_enabled: self.fallback_api_base_url.is_some(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<CheckoutConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        CheckoutConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[(API_BASE_URL, "https://api.example/")]).unwrap();
        assert_eq!(config.api_base_url, "https://api.example");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_max_attempts, 3);
        assert_eq!(config.poll_backoff, Duration::from_secs(2));
        assert_eq!(config.fallback_api_base_url, None);
        assert!(!config.poll_policy().fallback_enabled);
    }

    #[test]
    fn base_url_is_required() {
        assert_eq!(load(&[]), Err(ConfigError::Missing(API_BASE_URL)));
        assert_eq!(load(&[(API_BASE_URL, "  ")]), Err(ConfigError::Missing(API_BASE_URL)));
    }

    #[test]
    fn fallback_enables_second_host() {
        let config = load(&[
            (API_BASE_URL, "https://a"),
            (FALLBACK_API_BASE_URL, "https://b/"),
            (POLL_BACKOFF_MS, "500"),
        ])
        .unwrap();
        let policy = config.poll_policy();
        assert!(policy.fallback_enabled);
        assert_eq!(policy.backoff, Duration::from_millis(500));
        assert_eq!(config.fallback_api_base_url.as_deref(), Some("https://b"));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert_eq!(
            load(&[(API_BASE_URL, "https://a"), (REQUEST_TIMEOUT_SECS, "soon")]),
            Err(ConfigError::Invalid {
                key: REQUEST_TIMEOUT_SECS,
                value: "soon".to_string()
            })
        );
        assert!(matches!(
            load(&[(API_BASE_URL, "https://a"), (POLL_MAX_ATTEMPTS, "0")]),
            Err(ConfigError::Invalid { key: POLL_MAX_ATTEMPTS, .. })
        ));
    }
}
