//! REST client for the backend services

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use voyage_checkout_core::api::{
    ApiFuture, BookingApi, CatalogService, CouponApi, CouponValidation, OrderCheck, PaymentApi,
    PaymentHost, PaymentStatus, ServiceCatalog, UserApi, discount_from_raw,
};
use voyage_checkout_core::booking::{Booking, BookingId, BookingStatus, ComboId, UserId, normalize_booking};
use voyage_checkout_core::error::ApiError;
use voyage_checkout_core::intent::IntentRequest;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ValidateCouponRequest<'a> {
    code: &'a str,
    service_combo_id: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DiscountRequest<'a> {
    code: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    original_amount: Decimal,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CouponBookingRequest<'a> {
    booking_id: BookingId,
    coupon_code: &'a str,
}

/// Backend REST client
///
/// Implements every collaborator trait of the checkout core. Order-code
/// checks can go to a second host; every other call uses the primary host.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    primary_url: String,
    fallback_url: Option<String>,
    token: Option<String>,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("primary_url", &self.primary_url)
            .field("fallback_url", &self.fallback_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Create a client for `base_url` with the given request timeout
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotConfigured`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::NotConfigured(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            primary_url: base_url.into().trim_end_matches('/').to_string(),
            fallback_url: None,
            token: None,
        })
    }

    /// Host used for order-code checks once the primary is exhausted
    #[must_use]
    pub fn with_fallback(mut self, fallback_url: Option<String>) -> Self {
        self.fallback_url = fallback_url.map(|url| url.trim_end_matches('/').to_string());
        self
    }

    /// Bearer token sent with every request
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Primary base URL
    #[must_use]
    pub fn primary_url(&self) -> &str {
        &self.primary_url
    }

    fn base_url(&self, host: PaymentHost) -> Result<&str, ApiError> {
        match host {
            PaymentHost::Primary => Ok(&self.primary_url),
            PaymentHost::Fallback => self
                .fallback_url
                .as_deref()
                .ok_or_else(|| ApiError::NotConfigured("fallback payment host".to_string())),
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and decode the body as JSON
    ///
    /// An empty body decodes to `Null`; a body that is not JSON is kept as a
    /// JSON string.
    async fn send(&self, builder: RequestBuilder) -> Result<Value, ApiError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = response.status();
        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "Backend request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(%url, status = status.as_u16(), "Backend request succeeded");

        if body.trim().is_empty() || status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }

    async fn get(&self, path: &str) -> Result<Value, ApiError> {
        let url = format!("{}{path}", self.primary_url);
        self.send(self.request(Method::GET, &url)).await
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<Value, ApiError> {
        let url = format!("{}{path}", self.primary_url);
        self.send(self.request(Method::POST, &url).json(body)).await
    }
}

/// Unwrap a `{ data: ... }` envelope when present
fn unwrap_data(raw: Value) -> Value {
    match raw {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        },
        other => other,
    }
}

impl BookingApi for BackendClient {
    fn get_booking(&self, id: BookingId) -> ApiFuture<'_, Booking> {
        Box::pin(async move {
            let raw = unwrap_data(self.get(&format!("/Booking/{id}")).await?);
            normalize_booking(&raw).map_err(|e| ApiError::Decode(e.to_string()))
        })
    }

    fn update_status(&self, id: BookingId, status: BookingStatus) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let url = format!("{}/Booking/{id}/status", self.primary_url);
            self.send(self.request(Method::PUT, &url).json(status.as_str()))
                .await
                .map(|_| ())
        })
    }
}

impl CouponApi for BackendClient {
    fn validate(&self, code: String, combo_id: Option<ComboId>) -> ApiFuture<'_, CouponValidation> {
        Box::pin(async move {
            let body = ValidateCouponRequest {
                code: &code,
                service_combo_id: combo_id.map(|c| c.0),
            };
            let raw = self.post("/Coupon/validate", &body).await?;
            Ok(CouponValidation::from_raw(&unwrap_data(raw)))
        })
    }

    fn calculate_discount(&self, code: String, original_amount: Decimal) -> ApiFuture<'_, Decimal> {
        Box::pin(async move {
            let body = DiscountRequest {
                code: &code,
                original_amount,
            };
            let raw = unwrap_data(self.post("/Coupon/calculate-discount", &body).await?);
            discount_from_raw(&raw)
                .ok_or_else(|| ApiError::Decode(format!("No discount in response: {raw}")))
        })
    }

    fn apply(&self, booking_id: BookingId, code: String) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let body = CouponBookingRequest {
                booking_id,
                coupon_code: &code,
            };
            self.post("/Coupon/apply", &body).await.map(|_| ())
        })
    }

    fn remove(&self, booking_id: BookingId, code: String) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let body = CouponBookingRequest {
                booking_id,
                coupon_code: &code,
            };
            self.post("/Coupon/remove", &body).await.map(|_| ())
        })
    }
}

impl ServiceCatalog for BackendClient {
    fn combo_services(&self, combo_id: ComboId) -> ApiFuture<'_, Vec<CatalogService>> {
        Box::pin(async move {
            let raw = unwrap_data(self.get(&format!("/ServiceComboDetail/combo/{combo_id}")).await?);
            match raw {
                Value::Array(entries) => Ok(entries.iter().filter_map(CatalogService::from_raw).collect()),
                Value::Null => Ok(Vec::new()),
                other => Err(ApiError::Decode(format!("Expected a service list, got {other}"))),
            }
        })
    }
}

impl PaymentApi for BackendClient {
    fn create_intent(&self, request: IntentRequest) -> ApiFuture<'_, Value> {
        Box::pin(async move { self.post("/Payment/create-intent", &request).await })
    }

    fn payment_status(&self, booking_id: BookingId) -> ApiFuture<'_, PaymentStatus> {
        Box::pin(async move {
            let raw = unwrap_data(self.get(&format!("/Payment/status/{booking_id}")).await?);
            Ok(PaymentStatus::from_raw(&raw))
        })
    }

    fn check_by_order_code(&self, host: PaymentHost, order_code: String) -> ApiFuture<'_, OrderCheck> {
        Box::pin(async move {
            let url = format!("{}/Payment/check-payment-by-ordercode", self.base_url(host)?);
            debug!(%host, %order_code, "Checking payment by order code");
            let builder = self
                .request(Method::GET, &url)
                .query(&[("orderCode", order_code.as_str())]);
            let raw = self.send(builder).await?;
            Ok(OrderCheck::from_raw(&raw))
        })
    }
}

impl UserApi for BackendClient {
    fn update_spent(&self, user_id: UserId, amount_spent: Decimal) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let url = format!("{}/User/update-spent/{user_id}", self.primary_url);
            let builder = self
                .request(Method::PUT, &url)
                .query(&[("amountSpent", amount_spent.normalize().to_string())]);
            self.send(builder).await.map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trailing_slashes_are_trimmed() {
        let client = BackendClient::new("https://api.example/", DEFAULT_TIMEOUT)
            .map(|c| c.with_fallback(Some("https://alt.example//".into())));
        let client = client.ok();
        assert_eq!(client.as_ref().map(BackendClient::primary_url), Some("https://api.example"));
        assert_eq!(
            client.and_then(|c| c.fallback_url),
            Some("https://alt.example".to_string())
        );
    }

    #[test]
    fn fallback_is_not_configured_by_default() {
        let client = BackendClient::new("https://api.example", DEFAULT_TIMEOUT).ok();
        let err = client.map(|c| c.base_url(PaymentHost::Fallback).map(str::to_string));
        assert!(matches!(err, Some(Err(ApiError::NotConfigured(_)))));
    }

    #[test]
    fn data_envelope_is_unwrapped() {
        assert_eq!(unwrap_data(json!({ "data": [1, 2] })), json!([1, 2]));
        assert_eq!(
            unwrap_data(json!({ "data": 1, "message": "ok" })),
            json!({ "data": 1, "message": "ok" })
        );
    }

    #[test]
    fn debug_redacts_token() {
        let client = BackendClient::new("https://api.example", DEFAULT_TIMEOUT)
            .map(|c| c.with_token(Some("secret".into())));
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("secret"));
    }
}
