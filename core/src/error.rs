//! Error types for the checkout core
//!
//! Two layers: [`ApiError`] is what a single collaborator call reports at the
//! transport level, and [`CheckoutError`] is the user-facing taxonomy the
//! payment-intent and coupon operations classify those failures into.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Upstream DNS-resolution failures as they show up in backend error payloads
static DNS_FAILURE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)name or service not known|no such host|getaddrinfo|enotfound|nodename nor servname|temporary failure in name resolution|name resolution",
    )
    .ok()
});

/// Failure of one call to a backend collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The server answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// No response was received (connection refused, timeout, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// The response arrived but could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The requested endpoint variant is not configured (e.g. no fallback host)
    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl ApiError {
    /// Status code, when the server answered
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Network-class failures: no response at all, or a gateway status
    #[must_use]
    pub const fn is_network_class(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Status { status, .. } => matches!(*status, 502..=504),
            ApiError::Decode(_) | ApiError::NotConfigured(_) => false,
        }
    }

    /// 401 and 403
    #[must_use]
    pub const fn is_authorization(&self) -> bool {
        matches!(self, ApiError::Status { status: 401 | 403, .. })
    }

    /// Best human-readable message carried by the response body
    ///
    /// Prefers a `message`/`Message`/`error` field of a JSON body and falls back
    /// to the raw text.
    #[must_use]
    pub fn server_message(&self) -> String {
        match self {
            ApiError::Status { body, .. } => extract_message(body),
            other => other.to_string(),
        }
    }
}

fn extract_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "Message", "error", "Error", "title", "Title"] {
            if let Some(text) = value.get(key).and_then(serde_json::Value::as_str) {
                return text.to_string();
            }
        }
        if let Some(text) = value.as_str() {
            return text.to_string();
        }
    }
    body.trim().to_string()
}

/// Returns true if the payload describes an upstream DNS-resolution failure
#[must_use]
pub fn looks_like_dns_failure(payload: &str) -> bool {
    DNS_FAILURE
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(payload))
}

/// How an error is handled by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Shown inline; blocks only the triggering action
    Validation,
    /// Session teardown and sign-in; aborts the operation
    Authorization,
    /// Actionable diagnostic; operation abandoned, booking unchanged
    Integration,
}

/// User-facing checkout errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    /// Input rejected locally or by the server (400)
    #[error("{0}")]
    Validation(String),

    /// The reconciled or requested amount is not positive
    #[error("Payable amount must be greater than zero (got {0})")]
    InvalidAmount(rust_decimal::Decimal),

    /// 401/403: the session must be re-established
    #[error("Your session has expired. Please sign in again.")]
    Unauthorized,

    /// 404
    #[error("{0} not found")]
    NotFound(String),

    /// 500 caused by the backend failing to resolve the payment provider host
    #[error(
        "The payment service could not reach the payment provider (DNS lookup failed). Check the backend's network/DNS configuration and try again. Details: {0}"
    )]
    UpstreamDns(String),

    /// Other server or integration failure
    #[error("Payment service error (HTTP {status}): {message}")]
    Integration {
        /// HTTP status code, 0 when the payload could not be decoded
        status: u16,
        /// Server-supplied detail
        message: String,
    },

    /// No response from the backend
    #[error("Could not connect to the payment service. Check your connection and try again. ({0})")]
    Connectivity(String),
}

impl CheckoutError {
    /// Classify this error into the handling taxonomy
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            CheckoutError::Validation(_)
            | CheckoutError::InvalidAmount(_)
            | CheckoutError::NotFound(_) => ErrorClass::Validation,
            CheckoutError::Unauthorized => ErrorClass::Authorization,
            CheckoutError::UpstreamDns(_)
            | CheckoutError::Integration { .. }
            | CheckoutError::Connectivity(_) => ErrorClass::Integration,
        }
    }

    /// True when the caller must drop the session and redirect to sign-in
    #[must_use]
    pub const fn requires_reauthentication(&self) -> bool {
        matches!(self, CheckoutError::Unauthorized)
    }

    /// Classify a collaborator failure by status code
    ///
    /// `resource` names what a 404 refers to (e.g. `"Booking 42"`).
    #[must_use]
    pub fn from_api(err: &ApiError, resource: &str) -> Self {
        match err {
            ApiError::Status { status: 401 | 403, .. } => CheckoutError::Unauthorized,
            ApiError::Status { status: 404, .. } => CheckoutError::NotFound(resource.to_string()),
            ApiError::Status { status: 400, .. } => CheckoutError::Validation(err.server_message()),
            ApiError::Status { status, body } => {
                if *status >= 500 && looks_like_dns_failure(body) {
                    CheckoutError::UpstreamDns(err.server_message())
                } else {
                    CheckoutError::Integration {
                        status: *status,
                        message: err.server_message(),
                    }
                }
            },
            ApiError::Network(detail) => CheckoutError::Connectivity(detail.clone()),
            ApiError::Decode(detail) | ApiError::NotConfigured(detail) => {
                CheckoutError::Integration {
                    status: 0,
                    message: detail.clone(),
                }
            },
        }
    }
}
