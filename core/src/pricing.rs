//! Base amount estimation
//!
//! Used when the authoritative total is absent, or to cross-check it when
//! deriving a discount.

use crate::booking::Booking;
use crate::session::ActorRole;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Multiplier applied to the discounted-partner role
pub const PARTNER_DISCOUNT_FACTOR: Decimal = dec!(0.97);

/// Estimate the payable base amount of a booking
///
/// `unit_price × quantity`, times [`PARTNER_DISCOUNT_FACTOR`] for the partner
/// role. A zero or overflowing estimate falls back to the booking's
/// authoritative total, which may itself be zero.
#[must_use]
pub fn estimate_base_amount(booking: &Booking, role: &ActorRole) -> Decimal {
    let amount = list_price(booking).and_then(|amount| {
        if role.is_discounted_partner() {
            amount.checked_mul(PARTNER_DISCOUNT_FACTOR)
        } else {
            Some(amount)
        }
    });
    match amount {
        Some(amount) if !amount.is_zero() => amount,
        _ => booking.total_amount,
    }
}

/// `unit_price × quantity`, with no role adjustment
///
/// Falls back to the authoritative total when the product overflows.
#[must_use]
pub fn undiscounted_total(booking: &Booking) -> Decimal {
    list_price(booking).unwrap_or(booking.total_amount)
}

fn list_price(booking: &Booking) -> Option<Decimal> {
    let amount = booking.unit_price.checked_mul(Decimal::from(booking.quantity));
    if amount.is_none() {
        tracing::warn!(
            booking_id = %booking.id,
            unit_price = %booking.unit_price,
            quantity = booking.quantity,
            "List price overflows"
        );
    }
    amount
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::BookingId;

    fn booking(quantity: u32, unit_price: Decimal, total: Decimal) -> Booking {
        Booking {
            quantity,
            unit_price,
            total_amount: total,
            ..Booking::new(BookingId(1))
        }
    }

    #[test]
    fn agency_gets_partner_factor() {
        let b = booking(2, dec!(500000), dec!(0));
        assert_eq!(estimate_base_amount(&b, &ActorRole::Agency), dec!(970000));
    }

    #[test]
    fn customer_pays_list_price() {
        let b = booking(2, dec!(500000), dec!(0));
        assert_eq!(estimate_base_amount(&b, &ActorRole::Customer), dec!(1000000));
    }

    #[test]
    fn zero_estimate_falls_back_to_authoritative_total() {
        let b = booking(0, dec!(500000), dec!(123456));
        assert_eq!(estimate_base_amount(&b, &ActorRole::Agency), dec!(123456));
    }

    #[test]
    fn overflowing_list_price_falls_back_to_authoritative_total() {
        let b = booking(2, Decimal::MAX, dec!(750000));
        assert_eq!(estimate_base_amount(&b, &ActorRole::Customer), dec!(750000));
        assert_eq!(estimate_base_amount(&b, &ActorRole::Agency), dec!(750000));
        assert_eq!(undiscounted_total(&b), dec!(750000));
    }

    #[test]
    fn zero_everything_stays_zero() {
        let b = booking(0, Decimal::ZERO, Decimal::ZERO);
        assert_eq!(estimate_base_amount(&b, &ActorRole::Customer), Decimal::ZERO);
    }
}
