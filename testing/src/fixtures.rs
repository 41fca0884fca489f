//! Builders for checkout test data

use rust_decimal::Decimal;
use serde_json::{Value, json};
use voyage_checkout_core::api::{CatalogService, OrderCheck, PaymentStatus};
use voyage_checkout_core::booking::{AttachedCoupon, Booking, BookingId, BookingStatus, ComboId, UserId};
use voyage_checkout_core::notes::{ServiceSelection, parse_additional_services, parse_coupon_code};

/// Fluent builder for [`Booking`]
///
/// ```
/// use voyage_checkout_testing::BookingBuilder;
/// use rust_decimal_macros::dec;
///
/// let booking = BookingBuilder::new(1).quantity(2).unit_price(dec!(500000)).build();
/// assert_eq!(booking.quantity, 2);
/// ```
#[derive(Debug, Clone)]
pub struct BookingBuilder {
    booking: Booking,
}

impl BookingBuilder {
    /// Pending booking with one unit and no amounts
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self {
            booking: Booking {
                quantity: 1,
                ..Booking::new(BookingId(id))
            },
        }
    }

    /// Owning user
    #[must_use]
    pub const fn user(mut self, id: i64) -> Self {
        self.booking.user_id = Some(UserId(id));
        self
    }

    /// Booked combo
    #[must_use]
    pub const fn combo(mut self, id: i64) -> Self {
        self.booking.combo_id = Some(ComboId(id));
        self
    }

    /// Units booked
    #[must_use]
    pub const fn quantity(mut self, quantity: u32) -> Self {
        self.booking.quantity = quantity;
        self
    }

    /// Unit price
    #[must_use]
    pub const fn unit_price(mut self, price: Decimal) -> Self {
        self.booking.unit_price = price;
        self
    }

    /// Backend-authoritative total
    #[must_use]
    pub const fn total(mut self, total: Decimal) -> Self {
        self.booking.total_amount = total;
        self
    }

    /// Lifecycle status
    #[must_use]
    pub fn status(mut self, status: BookingStatus) -> Self {
        self.booking.status = status;
        self
    }

    /// Notes; markers are decoded the way normalization does
    #[must_use]
    pub fn notes(mut self, notes: &str) -> Self {
        self.booking.notes = notes.to_string();
        self.booking.applied_coupon_code = parse_coupon_code(notes);
        self.booking.additional_services = parse_additional_services(notes);
        self
    }

    /// Relationally attached coupon
    #[must_use]
    pub fn attached_coupon(mut self, code: &str) -> Self {
        let coupon_id = i64::try_from(self.booking.attached_coupons.len()).unwrap_or_default() + 1;
        self.booking.attached_coupons.push(AttachedCoupon {
            coupon_id: Some(coupon_id),
            code: Some(code.to_string()),
        });
        self
    }

    /// Add-on selection
    #[must_use]
    pub fn add_on(mut self, service_id: i64, quantity: u32) -> Self {
        self.booking.additional_services.push(ServiceSelection {
            service_id,
            quantity,
        });
        self
    }

    /// Finish
    #[must_use]
    pub fn build(self) -> Booking {
        self.booking
    }
}

/// Catalog entry
#[must_use]
pub fn catalog_service(id: i64, name: &str, unit_price: Decimal) -> CatalogService {
    CatalogService {
        id,
        name: name.to_string(),
        unit_price,
    }
}

/// Order-code check that found the payment not yet settled
#[must_use]
pub fn not_paid() -> OrderCheck {
    OrderCheck {
        was_updated: false,
        is_paid: false,
        status: Some("pending".to_string()),
    }
}

/// Order-code check that flipped the payment to paid
#[must_use]
pub fn updated() -> OrderCheck {
    OrderCheck {
        was_updated: true,
        is_paid: true,
        status: Some("paid".to_string()),
    }
}

/// Order-code check that found the payment already paid
#[must_use]
pub fn already_paid() -> OrderCheck {
    OrderCheck {
        was_updated: false,
        is_paid: true,
        status: Some("paid".to_string()),
    }
}

/// Paid payment record for `amount`
#[must_use]
pub fn paid_status(amount: Decimal) -> PaymentStatus {
    PaymentStatus {
        status: "paid".to_string(),
        amount,
        method: Some("payos".to_string()),
        created_at: None,
        paid_at: None,
    }
}

/// Raw `GET /Booking/{id}` payload in the backend's PascalCase shape
#[must_use]
pub fn raw_booking(id: i64, unit_price: f64, quantity: u32, total: f64, notes: &str) -> Value {
    json!({
        "Id": id,
        "UserId": 10,
        "ServiceComboId": 4,
        "Quantity": quantity,
        "TotalAmount": total,
        "Status": "pending",
        "Notes": notes,
        "ServiceCombo": { "Id": 4, "Name": "Ha Long Bay", "Price": unit_price },
        "BookingCoupons": []
    })
}
