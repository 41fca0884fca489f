//! Payment intent creation
//!
//! Opens a checkout session with the payment provider for a reconciled
//! amount. The provider's response shape varies, so the checkout URL is
//! probed from several candidate paths.

use crate::api::PaymentApi;
use crate::booking::BookingId;
use crate::error::CheckoutError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Provider limit on the payment description, in characters
pub const DESCRIPTION_LIMIT: usize = 25;

/// JSON pointer paths probed for the checkout URL, in order
pub const CHECKOUT_URL_PATHS: [&str; 4] = [
    "/checkoutUrl",
    "/CheckoutUrl",
    "/data/checkoutUrl",
    "/data/paymentUrl",
];

/// Body of `POST /Payment/create-intent`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IntentRequest {
    /// Booking being paid
    pub booking_id: BookingId,
    /// Reconciled amount
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Description shown by the provider
    pub description: String,
}

/// Where to send the customer to pay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRedirect {
    /// Booking being paid
    pub booking_id: BookingId,
    /// Amount the session was opened for
    pub amount: Decimal,
    /// Provider checkout page
    pub checkout_url: String,
}

/// Cut a description to the provider limit on a character boundary
#[must_use]
pub fn truncate_description(description: &str) -> String {
    description.trim().chars().take(DESCRIPTION_LIMIT).collect()
}

/// Find the checkout URL in a create-intent response
#[must_use]
pub fn extract_checkout_url(raw: &Value) -> Option<String> {
    let non_empty = |v: &Value| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    CHECKOUT_URL_PATHS
        .iter()
        .find_map(|path| raw.pointer(path).and_then(non_empty))
        .or_else(|| {
            non_empty(raw).filter(|s| s.starts_with("http://") || s.starts_with("https://"))
        })
}

/// Create a checkout session for `amount`
///
/// Local validation happens before any request is sent.
///
/// # Errors
///
/// - [`CheckoutError::InvalidAmount`] when `amount` is not positive
/// - [`CheckoutError::Validation`] for a blank or over-long description, or a 400
/// - [`CheckoutError::Unauthorized`] on 401/403
/// - [`CheckoutError::NotFound`] on 404
/// - [`CheckoutError::UpstreamDns`] / [`CheckoutError::Integration`] on 5xx or a
///   response without a checkout URL
/// - [`CheckoutError::Connectivity`] when no response arrives
#[tracing::instrument(skip_all, fields(%booking_id, %amount))]
pub async fn create_intent(
    payments: &dyn PaymentApi,
    booking_id: BookingId,
    amount: Decimal,
    description: &str,
) -> Result<CheckoutRedirect, CheckoutError> {
    if amount <= Decimal::ZERO {
        return Err(CheckoutError::InvalidAmount(amount));
    }
    if description.trim().is_empty() {
        return Err(CheckoutError::Validation(
            "Payment description is required".to_string(),
        ));
    }
    if description.chars().count() > DESCRIPTION_LIMIT {
        return Err(CheckoutError::Validation(format!(
            "Payment description must be at most {DESCRIPTION_LIMIT} characters"
        )));
    }

    let request = IntentRequest {
        booking_id,
        amount,
        description: description.to_string(),
    };
    let raw = payments.create_intent(request).await.map_err(|error| {
        warn!(%error, "Payment intent request failed");
        CheckoutError::from_api(&error, &format!("Booking {booking_id}"))
    })?;

    let checkout_url = extract_checkout_url(&raw).ok_or_else(|| CheckoutError::Integration {
        status: 200,
        message: "Payment provider response did not include a checkout URL".to_string(),
    })?;

    info!(%checkout_url, "Payment intent created");
    Ok(CheckoutRedirect {
        booking_id,
        amount,
        checkout_url,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn probes_all_candidate_paths() {
        let url = "https://pay.example/c/1";
        for raw in [
            json!({ "checkoutUrl": url }),
            json!({ "CheckoutUrl": url }),
            json!({ "data": { "checkoutUrl": url } }),
            json!({ "data": { "paymentUrl": url } }),
            json!(url),
        ] {
            assert_eq!(extract_checkout_url(&raw).as_deref(), Some(url), "{raw}");
        }
    }

    #[test]
    fn first_matching_path_wins() {
        let raw = json!({ "checkoutUrl": "https://a", "data": { "checkoutUrl": "https://b" } });
        assert_eq!(extract_checkout_url(&raw).as_deref(), Some("https://a"));
    }

    #[test]
    fn blank_or_missing_url_is_none() {
        assert_eq!(extract_checkout_url(&json!({ "checkoutUrl": "  " })), None);
        assert_eq!(extract_checkout_url(&json!({ "status": "ok" })), None);
        assert_eq!(extract_checkout_url(&json!("not a url")), None);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "Thanh toán tour Hạ Long 3 ngày 2 đêm";
        let cut = truncate_description(long);
        assert_eq!(cut.chars().count(), DESCRIPTION_LIMIT);
        assert!(long.starts_with(&cut));
    }

    #[test]
    fn request_serializes_pascal_case_with_numeric_amount() {
        let request = IntentRequest {
            booking_id: BookingId(12),
            amount: dec!(250000),
            description: "Booking 12".into(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["BookingId"], json!(12));
        assert_eq!(value["Amount"].as_f64(), Some(250_000.0));
        assert_eq!(value["Description"], json!("Booking 12"));
    }
}
