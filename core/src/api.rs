//! Collaborator traits for the backend services the checkout consumes
//!
//! The booking, coupon, catalog, payment and user services are opaque HTTP
//! endpoints. The core only sees them through these traits; the backend crate
//! implements them over `reqwest`, the testing crate with scripted mocks.
//!
//! The traits return boxed futures so they stay object-safe and can be held as
//! `Arc<dyn ...>` inside environments.

use crate::booking::{
    Booking, BookingId, BookingStatus, ComboId, UserId, decimal_value, integer_value, pick,
    pick_any, string_value,
};
use crate::error::ApiError;
use crate::intent::IntentRequest;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every collaborator call
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Which backend host a confirmation check goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentHost {
    /// The configured API host
    Primary,
    /// The alternate host tried once the primary is exhausted
    Fallback,
}

impl std::fmt::Display for PaymentHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentHost::Primary => write!(f, "primary"),
            PaymentHost::Fallback => write!(f, "fallback"),
        }
    }
}

/// `GET /Booking/{id}` and `PUT /Booking/{id}/status`
pub trait BookingApi: Send + Sync {
    /// Fetch and normalize a booking
    fn get_booking(&self, id: BookingId) -> ApiFuture<'_, Booking>;

    /// Write a new booking status
    fn update_status(&self, id: BookingId, status: BookingStatus) -> ApiFuture<'_, ()>;
}

/// Outcome of a coupon validation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponValidation {
    /// Whether the coupon may be used on the item
    pub valid: bool,
    /// Server explanation, mostly present when invalid
    pub message: Option<String>,
}

impl CouponValidation {
    /// Decode `{IsValid|Valid, Message}`; a bare boolean is accepted too
    #[must_use]
    pub fn from_raw(raw: &Value) -> Self {
        if let Some(valid) = raw.as_bool() {
            return Self {
                valid,
                message: None,
            };
        }
        Self {
            valid: pick_any(raw, &["IsValid", "Valid"])
                .and_then(Value::as_bool)
                .unwrap_or(false),
            message: pick(raw, "Message").and_then(string_value),
        }
    }
}

/// Read the discount from a `calculate-discount` response (`{Discount}` or a bare number)
#[must_use]
pub fn discount_from_raw(raw: &Value) -> Option<Decimal> {
    decimal_value(raw).or_else(|| {
        pick_any(raw, &["Discount", "DiscountAmount"]).and_then(decimal_value)
    })
}

/// `/Coupon/...` endpoints
pub trait CouponApi: Send + Sync {
    /// Check a code against the bookable item
    fn validate(&self, code: String, combo_id: Option<ComboId>) -> ApiFuture<'_, CouponValidation>;

    /// Discount the code yields on `original_amount`
    fn calculate_discount(&self, code: String, original_amount: Decimal) -> ApiFuture<'_, Decimal>;

    /// Attach the coupon to the booking
    fn apply(&self, booking_id: BookingId, code: String) -> ApiFuture<'_, ()>;

    /// Detach the coupon from the booking
    fn remove(&self, booking_id: BookingId, code: String) -> ApiFuture<'_, ()>;
}

/// One add-on service offered with a combo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogService {
    /// Service id referenced by the notes marker
    pub id: i64,
    /// Display name
    pub name: String,
    /// Unit price
    pub unit_price: Decimal,
}

impl CatalogService {
    /// Decode one `ServiceComboDetail` entry
    ///
    /// The service may be nested (`{ServiceId, Service: {Name, Price}}`) or
    /// flat (`{Id, Name, Price}`). The detail's own quantity is ignored.
    #[must_use]
    pub fn from_raw(raw: &Value) -> Option<Self> {
        let nested = pick(raw, "Service");
        let id = pick(raw, "ServiceId")
            .or_else(|| nested.and_then(|s| pick(s, "Id")))
            .or_else(|| pick(raw, "Id"))
            .and_then(integer_value)?;
        let name = nested
            .and_then(|s| pick(s, "Name"))
            .or_else(|| pick(raw, "Name"))
            .and_then(string_value)
            .unwrap_or_default();
        let unit_price = nested
            .and_then(|s| pick(s, "Price"))
            .or_else(|| pick(raw, "Price"))
            .and_then(decimal_value)
            .unwrap_or_default();
        Some(Self {
            id,
            name,
            unit_price,
        })
    }
}

/// `GET /ServiceComboDetail/combo/{id}`
pub trait ServiceCatalog: Send + Sync {
    /// Full add-on catalog of a combo
    fn combo_services(&self, combo_id: ComboId) -> ApiFuture<'_, Vec<CatalogService>>;
}

/// Payment record as reported by `GET /Payment/status/{bookingId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatus {
    /// Provider status, lower-cased
    pub status: String,
    /// Amount paid
    pub amount: Decimal,
    /// Payment method, when reported
    pub method: Option<String>,
    /// Creation time, when reported
    pub created_at: Option<DateTime<Utc>>,
    /// Settlement time, when reported
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentStatus {
    /// Decode `{Status|status, Amount|amount, ...}`
    #[must_use]
    pub fn from_raw(raw: &Value) -> Self {
        let timestamp = |name: &str| {
            pick(raw, name)
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc))
        };
        Self {
            status: pick(raw, "Status")
                .and_then(string_value)
                .unwrap_or_else(|| "pending".to_string())
                .trim()
                .to_ascii_lowercase(),
            amount: pick(raw, "Amount").and_then(decimal_value).unwrap_or_default(),
            method: pick_any(raw, &["Method", "PaymentMethod"]).and_then(string_value),
            created_at: timestamp("CreatedAt"),
            paid_at: timestamp("PaidAt").or_else(|| timestamp("UpdatedAt")),
        }
    }

    /// Provider reports the payment as settled
    #[must_use]
    pub fn is_paid(&self) -> bool {
        matches!(self.status.as_str(), "paid" | "completed" | "success")
    }
}

/// Result of `check-payment-by-ordercode`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCheck {
    /// The backend flipped the payment to paid during this call
    pub was_updated: bool,
    /// The payment is paid (now or before)
    pub is_paid: bool,
    /// Provider status, when reported
    pub status: Option<String>,
}

impl OrderCheck {
    /// Decode `{wasUpdated, paymentStatus: {isPaid, status}}`
    #[must_use]
    pub fn from_raw(raw: &Value) -> Self {
        let payment = pick(raw, "PaymentStatus");
        Self {
            was_updated: pick(raw, "WasUpdated")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            is_paid: payment
                .and_then(|p| pick(p, "IsPaid"))
                .or_else(|| pick(raw, "IsPaid"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            status: payment
                .and_then(|p| pick(p, "Status"))
                .and_then(string_value),
        }
    }
}

/// `/Payment/...` endpoints
pub trait PaymentApi: Send + Sync {
    /// `POST /Payment/create-intent`; the response shape is not fixed, so it
    /// is returned raw for [`crate::intent::extract_checkout_url`]
    fn create_intent(&self, request: IntentRequest) -> ApiFuture<'_, Value>;

    /// `GET /Payment/status/{bookingId}`
    fn payment_status(&self, booking_id: BookingId) -> ApiFuture<'_, PaymentStatus>;

    /// `GET /Payment/check-payment-by-ordercode?orderCode=...` on `host`
    fn check_by_order_code(&self, host: PaymentHost, order_code: String) -> ApiFuture<'_, OrderCheck>;
}

/// `/User/...` endpoints
pub trait UserApi: Send + Sync {
    /// `PUT /User/update-spent/{userId}?amountSpent=...`
    fn update_spent(&self, user_id: UserId, amount_spent: Decimal) -> ApiFuture<'_, ()>;
}
