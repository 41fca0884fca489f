//! Canonical booking model and the normalization boundary
//!
//! The backend returns the same fields in PascalCase or camelCase depending on
//! the endpoint. [`normalize_booking`] runs once at the I/O edge and produces a
//! single canonical [`Booking`]; nothing past this module looks at raw JSON.

use crate::notes::{self, ServiceSelection};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Booking identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookingId(pub i64);

impl std::fmt::Display for BookingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Service combo (bookable bundle) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComboId(pub i64);

impl std::fmt::Display for ComboId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Booking lifecycle status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    /// Created, awaiting payment
    Pending,
    /// Payment confirmed
    Paid,
    /// Confirmed by the host
    Confirmed,
    /// Trip completed
    Completed,
    /// Cancelled
    Cancelled,
    /// Unrecognised status, kept verbatim
    Other(String),
}

impl BookingStatus {
    /// Parse a backend status string, case-insensitively
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "" => BookingStatus::Pending,
            "paid" => BookingStatus::Paid,
            "confirmed" => BookingStatus::Confirmed,
            "completed" => BookingStatus::Completed,
            "cancelled" | "canceled" => BookingStatus::Cancelled,
            _ => BookingStatus::Other(raw.trim().to_string()),
        }
    }

    /// Statuses past the `pending → paid` transition
    #[must_use]
    pub fn is_settled(&self) -> bool {
        match self {
            BookingStatus::Paid | BookingStatus::Confirmed | BookingStatus::Completed => true,
            BookingStatus::Other(raw) => raw.eq_ignore_ascii_case("success"),
            BookingStatus::Pending | BookingStatus::Cancelled => false,
        }
    }

    /// Wire form of the status
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Paid => "paid",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Other(raw) => raw,
        }
    }
}

/// A coupon attached to the booking through the relational link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedCoupon {
    /// Coupon id, when present
    pub coupon_id: Option<i64>,
    /// Coupon code, when the relation embeds the coupon
    pub code: Option<String>,
}

/// Canonical booking record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking id
    pub id: BookingId,
    /// Owning user
    pub user_id: Option<UserId>,
    /// Booked combo, when the booking is for a combo
    pub combo_id: Option<ComboId>,
    /// Number of units booked
    pub quantity: u32,
    /// Unit price of the booked item
    pub unit_price: Decimal,
    /// Backend-authoritative total
    pub total_amount: Decimal,
    /// Lifecycle status
    pub status: BookingStatus,
    /// Free-text notes, markers included
    pub notes: String,
    /// Relationally attached coupons
    pub attached_coupons: Vec<AttachedCoupon>,
    /// Coupon applied through the notes marker
    pub applied_coupon_code: Option<String>,
    /// Add-on selections from the notes marker
    pub additional_services: Vec<ServiceSelection>,
}

impl Booking {
    /// A pending booking with every amount at zero
    #[must_use]
    pub const fn new(id: BookingId) -> Self {
        Self {
            id,
            user_id: None,
            combo_id: None,
            quantity: 0,
            unit_price: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            status: BookingStatus::Pending,
            notes: String::new(),
            attached_coupons: Vec::new(),
            applied_coupon_code: None,
            additional_services: Vec::new(),
        }
    }

    /// True when a coupon is attached relationally
    #[must_use]
    pub fn has_attached_coupon(&self) -> bool {
        !self.attached_coupons.is_empty()
    }

    /// Code of the first relationally attached coupon that carries one
    #[must_use]
    pub fn attached_coupon_code(&self) -> Option<&str> {
        self.attached_coupons
            .iter()
            .find_map(|coupon| coupon.code.as_deref())
    }

    /// Drop the notes coupon marker when it still names `code`
    ///
    /// Returns true when a marker was removed.
    pub fn clear_coupon_marker(&mut self, code: &str) -> bool {
        let code = code.trim();
        if code.is_empty() || self.applied_coupon_code.as_deref() != Some(code) {
            return false;
        }
        self.notes = notes::strip_coupon_marker(&self.notes);
        self.applied_coupon_code = None;
        true
    }
}

/// Raw booking payload could not be turned into a [`Booking`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// The payload is not a JSON object
    #[error("Expected a JSON object, got {0}")]
    NotAnObject(String),

    /// A required field is missing or unusable
    #[error("Missing or invalid field: {0}")]
    MissingField(&'static str),
}

/// Look up `name` in PascalCase first, then camelCase
pub(crate) fn pick<'a>(raw: &'a Value, name: &str) -> Option<&'a Value> {
    if let Some(value) = raw.get(name).filter(|v| !v.is_null()) {
        return Some(value);
    }
    let mut chars = name.chars();
    let camel: String = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => return None,
    };
    raw.get(camel.as_str()).filter(|v| !v.is_null())
}

/// First of `names` present in either casing
pub(crate) fn pick_any<'a>(raw: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| pick(raw, name))
}

/// Numeric value from a JSON number or numeric string
pub(crate) fn decimal_value(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    text.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(&text).ok())
}

/// Integer value from a JSON number or numeric string
///
/// Integral floats such as `2.0` are accepted; fractional values are not.
pub(crate) fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) if n.is_i64() => n.as_i64(),
        Value::Number(_) | Value::String(_) => decimal_value(value)
            .filter(|amount| amount.fract().is_zero())
            .and_then(|amount| amount.to_i64()),
        _ => None,
    }
}

/// String value; numbers are rendered
pub(crate) fn string_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn attached_coupon(raw: &Value) -> Option<AttachedCoupon> {
    let nested = pick(raw, "Coupon");
    let code = nested
        .and_then(|coupon| pick(coupon, "Code"))
        .or_else(|| pick(raw, "Code"))
        .and_then(string_value)
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty());
    let coupon_id = pick(raw, "CouponId")
        .or_else(|| nested.and_then(|coupon| pick(coupon, "Id")))
        .and_then(integer_value);
    (code.is_some() || coupon_id.is_some()).then_some(AttachedCoupon { coupon_id, code })
}

fn attached_coupons(raw: &Value) -> Vec<AttachedCoupon> {
    if let Some(Value::Array(links)) = pick(raw, "BookingCoupons") {
        let coupons: Vec<_> = links.iter().filter_map(attached_coupon).collect();
        if !coupons.is_empty() {
            return coupons;
        }
    }
    let direct = pick(raw, "Coupon")
        .and_then(attached_coupon)
        .or_else(|| {
            pick(raw, "CouponId")
                .and_then(integer_value)
                .map(|id| AttachedCoupon {
                    coupon_id: Some(id),
                    code: None,
                })
        });
    direct.into_iter().collect()
}

/// Normalize a raw booking payload into the canonical [`Booking`]
///
/// Missing numeric fields default to zero. The notes markers are decoded here.
///
/// # Errors
///
/// Returns [`NormalizeError`] if the payload is not an object or carries no
/// usable booking id.
pub fn normalize_booking(raw: &Value) -> Result<Booking, NormalizeError> {
    if !raw.is_object() {
        return Err(NormalizeError::NotAnObject(raw.to_string()));
    }

    let id = pick_any(raw, &["Id", "BookingId"])
        .and_then(integer_value)
        .map(BookingId)
        .ok_or(NormalizeError::MissingField("Id"))?;

    let combo = pick(raw, "ServiceCombo");
    let service = pick(raw, "Service");

    let unit_price = combo
        .and_then(|c| pick(c, "Price"))
        .or_else(|| service.and_then(|s| pick(s, "Price")))
        .or_else(|| pick_any(raw, &["UnitPrice", "BaseAmount"]))
        .and_then(decimal_value)
        .unwrap_or_default();

    let combo_id = pick(raw, "ServiceComboId")
        .or_else(|| combo.and_then(|c| pick(c, "Id")))
        .and_then(integer_value)
        .map(ComboId);

    let quantity = pick(raw, "Quantity")
        .and_then(integer_value)
        .and_then(|q| u32::try_from(q).ok())
        .unwrap_or(0);

    let total_amount = pick_any(raw, &["TotalAmount", "TotalPrice"])
        .and_then(decimal_value)
        .unwrap_or_default();

    let status = pick(raw, "Status")
        .and_then(string_value)
        .map_or(BookingStatus::Pending, |s| BookingStatus::parse(&s));

    let notes = pick(raw, "Notes")
        .and_then(string_value)
        .unwrap_or_default();

    Ok(Booking {
        id,
        user_id: pick(raw, "UserId").and_then(integer_value).map(UserId),
        combo_id,
        quantity,
        unit_price,
        total_amount,
        status,
        applied_coupon_code: notes::parse_coupon_code(&notes),
        additional_services: notes::parse_additional_services(&notes),
        notes,
        attached_coupons: attached_coupons(raw),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn normalizes_pascal_case_payload() {
        let raw = json!({
            "Id": 42,
            "UserId": 7,
            "Quantity": 2,
            "TotalAmount": 970000,
            "Status": "Pending",
            "ServiceComboId": 3,
            "ServiceCombo": { "Id": 3, "Price": 500000 },
            "Notes": "[ADDITIONAL_SERVICES:5:2] [COUPON_CODE:SUMMER]"
        });
        let booking = normalize_booking(&raw).unwrap();
        assert_eq!(booking.id, BookingId(42));
        assert_eq!(booking.user_id, Some(UserId(7)));
        assert_eq!(booking.combo_id, Some(ComboId(3)));
        assert_eq!(booking.quantity, 2);
        assert_eq!(booking.unit_price, dec!(500000));
        assert_eq!(booking.total_amount, dec!(970000));
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.applied_coupon_code.as_deref(), Some("SUMMER"));
        assert_eq!(booking.additional_services.len(), 1);
    }

    #[test]
    fn normalizes_camel_case_payload_with_string_numbers() {
        let raw = json!({
            "id": "42",
            "quantity": "3",
            "totalAmount": "1500.50",
            "status": "paid",
            "serviceCombo": { "id": 9, "price": "500.5" }
        });
        let booking = normalize_booking(&raw).unwrap();
        assert_eq!(booking.id, BookingId(42));
        assert_eq!(booking.combo_id, Some(ComboId(9)));
        assert_eq!(booking.unit_price, dec!(500.5));
        assert_eq!(booking.total_amount, dec!(1500.50));
        assert_eq!(booking.status, BookingStatus::Paid);
    }

    #[test]
    fn pascal_case_wins_when_both_present() {
        let raw = json!({ "Id": 1, "TotalAmount": 10, "totalAmount": 20 });
        assert_eq!(normalize_booking(&raw).unwrap().total_amount, dec!(10));
    }

    #[test]
    fn missing_numbers_default_to_zero() {
        let booking = normalize_booking(&json!({ "id": 5 })).unwrap();
        assert_eq!(booking.quantity, 0);
        assert_eq!(booking.unit_price, Decimal::ZERO);
        assert_eq!(booking.total_amount, Decimal::ZERO);
        assert!(booking.additional_services.is_empty());
    }

    #[test]
    fn falls_back_to_service_price_then_unit_price() {
        let with_service = json!({ "Id": 1, "Service": { "Price": 120 }, "UnitPrice": 99 });
        assert_eq!(normalize_booking(&with_service).unwrap().unit_price, dec!(120));
        let flat = json!({ "Id": 1, "UnitPrice": 99 });
        assert_eq!(normalize_booking(&flat).unwrap().unit_price, dec!(99));
    }

    #[test]
    fn reads_relational_coupons() {
        let raw = json!({
            "Id": 1,
            "BookingCoupons": [ { "CouponId": 4, "Coupon": { "Id": 4, "Code": "WELCOME" } } ]
        });
        let booking = normalize_booking(&raw).unwrap();
        assert!(booking.has_attached_coupon());
        assert_eq!(booking.attached_coupon_code(), Some("WELCOME"));

        let bare = json!({ "Id": 1, "couponId": 11 });
        let booking = normalize_booking(&bare).unwrap();
        assert_eq!(booking.attached_coupons[0].coupon_id, Some(11));
        assert_eq!(booking.attached_coupon_code(), None);
    }

    #[test]
    fn integral_float_quantity_is_accepted() {
        let booking =
            normalize_booking(&json!({ "Id": 3, "Quantity": 2.0, "ServiceComboId": "4.0" })).unwrap();
        assert_eq!(booking.quantity, 2);
        assert_eq!(booking.combo_id, Some(ComboId(4)));

        let fractional = normalize_booking(&json!({ "Id": 3, "quantity": 2.5 })).unwrap();
        assert_eq!(fractional.quantity, 0);
    }

    #[test]
    fn rejects_payload_without_id() {
        assert_eq!(
            normalize_booking(&json!({ "Quantity": 1 })),
            Err(NormalizeError::MissingField("Id"))
        );
        assert!(matches!(
            normalize_booking(&json!([1, 2])),
            Err(NormalizeError::NotAnObject(_))
        ));
    }

    #[test]
    fn settled_statuses() {
        for raw in ["paid", "Confirmed", "COMPLETED", "success"] {
            assert!(BookingStatus::parse(raw).is_settled(), "{raw}");
        }
        for raw in ["pending", "cancelled", "refunded"] {
            assert!(!BookingStatus::parse(raw).is_settled(), "{raw}");
        }
    }
}
