//! Discount resolution
//!
//! Recovers the coupon applied to a booking and derives the discount against
//! a known original total. Resolution never fails: when the discount endpoint
//! is unreachable it degrades to the difference between the estimated base
//! amount and the authoritative total.
//!
//! Precedence, first match wins:
//!
//! 1. relationally attached coupon
//! 2. coupon-code marker in the notes (server-side calculation)
//! 3. partner role (authoritative total is already discounted)
//! 4. no discount

use crate::api::CouponApi;
use crate::booking::Booking;
use crate::error::CheckoutError;
use crate::pricing::{PARTNER_DISCOUNT_FACTOR, estimate_base_amount, undiscounted_total};
use crate::session::Session;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Where a discount came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountSource {
    /// Coupon attached to the booking record
    AttachedCoupon,
    /// Notes coupon, amount confirmed by the discount endpoint
    NotesCoupon,
    /// Notes coupon, amount derived locally because the endpoint failed
    NotesCouponFallback,
    /// Fixed partner-role discount
    PartnerRole,
    /// No discount applies
    None,
}

/// Original total and the discount taken off it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountResolution {
    /// Amount before discount
    pub original_total: Decimal,
    /// Discount, zero when none applies
    pub discount_amount: Decimal,
    /// Coupon shown with the discount, only set when the discount is positive
    pub applied_coupon_code: Option<String>,
    /// Which rule produced the discount
    pub source: DiscountSource,
}

impl DiscountResolution {
    /// No discount on `original_total`
    #[must_use]
    pub const fn none(original_total: Decimal) -> Self {
        Self {
            original_total,
            discount_amount: Decimal::ZERO,
            applied_coupon_code: None,
            source: DiscountSource::None,
        }
    }

    /// True when a strictly positive discount applies
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.discount_amount > Decimal::ZERO
    }

    /// A discount that only counts when strictly positive
    fn discounted(
        booking: &Booking,
        session: &Session,
        original_total: Decimal,
        discount_amount: Decimal,
        coupon_code: Option<String>,
        source: DiscountSource,
    ) -> Self {
        if discount_amount > Decimal::ZERO {
            Self {
                original_total,
                discount_amount,
                applied_coupon_code: coupon_code,
                source,
            }
        } else {
            Self::none(undiscounted_original(booking, session))
        }
    }
}

/// `original - authoritative`; an overflow counts as no discount
fn difference(original: Decimal, authoritative: Decimal) -> Decimal {
    original.checked_sub(authoritative).unwrap_or(Decimal::ZERO)
}

/// Original total when no discount applies: the authoritative total, or the
/// estimate when the backend reported none
fn undiscounted_original(booking: &Booking, session: &Session) -> Decimal {
    if booking.total_amount > Decimal::ZERO {
        booking.total_amount
    } else {
        estimate_base_amount(booking, &session.role)
    }
}

/// Resolve the discount applied to `booking`
///
/// Never fails; endpoint errors are logged and replaced by arithmetic.
#[tracing::instrument(skip_all, fields(booking_id = %booking.id))]
pub async fn resolve_discount(
    booking: &Booking,
    session: &Session,
    coupons: &dyn CouponApi,
) -> DiscountResolution {
    let authoritative = booking.total_amount;

    if booking.has_attached_coupon() {
        let listed = undiscounted_total(booking);
        let original = if listed > authoritative {
            listed
        } else {
            estimate_base_amount(booking, &session.role)
        };
        debug!(%original, %authoritative, "Deriving discount from attached coupon");
        return DiscountResolution::discounted(
            booking,
            session,
            original,
            difference(original, authoritative),
            booking.attached_coupon_code().map(str::to_string),
            DiscountSource::AttachedCoupon,
        );
    }

    if let Some(code) = booking.applied_coupon_code.clone() {
        let base = estimate_base_amount(booking, &session.role);
        return match coupons.calculate_discount(code.clone(), base).await {
            Ok(discount) => {
                debug!(%code, %discount, "Discount endpoint answered");
                DiscountResolution::discounted(
                    booking,
                    session,
                    base,
                    discount,
                    Some(code),
                    DiscountSource::NotesCoupon,
                )
            },
            Err(error) => {
                warn!(%code, %error, "Discount endpoint failed, deriving discount from totals");
                DiscountResolution::discounted(
                    booking,
                    session,
                    base,
                    difference(base, authoritative),
                    Some(code),
                    DiscountSource::NotesCouponFallback,
                )
            },
        };
    }

    if session.role.is_discounted_partner() && authoritative > Decimal::ZERO {
        if let Some(original) = authoritative.checked_div(PARTNER_DISCOUNT_FACTOR) {
            let original = original.round_dp(2);
            return DiscountResolution::discounted(
                booking,
                session,
                original,
                difference(original, authoritative),
                None,
                DiscountSource::PartnerRole,
            );
        }
        warn!(%authoritative, "Partner original total overflows, no discount");
    }

    DiscountResolution::none(undiscounted_original(booking, session))
}

/// A coupon accepted by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    /// Normalized code
    pub code: String,
    /// Discount the server computed for it
    pub discount: Decimal,
}

/// Validate, price and attach a new coupon to `booking`
///
/// Rejections are reported, never retried. Callers reload the booking and
/// reconcile again on success.
///
/// # Errors
///
/// - [`CheckoutError::Validation`] for an empty, invalid or inapplicable code,
///   or one that yields no discount
/// - [`CheckoutError::Unauthorized`] on 401/403
/// - integration/connectivity errors for other failures
#[tracing::instrument(skip(booking, session, coupons), fields(booking_id = %booking.id))]
pub async fn apply_coupon(
    booking: &Booking,
    session: &Session,
    code: &str,
    coupons: &dyn CouponApi,
) -> Result<AppliedCoupon, CheckoutError> {
    let code = code.trim().to_string();
    if code.is_empty() {
        return Err(CheckoutError::Validation("Please enter a coupon code".to_string()));
    }
    let resource = format!("Coupon {code}");

    let validation = coupons
        .validate(code.clone(), booking.combo_id)
        .await
        .map_err(|e| CheckoutError::from_api(&e, &resource))?;
    if !validation.valid {
        return Err(CheckoutError::Validation(validation.message.unwrap_or_else(|| {
            format!("Coupon {code} cannot be used for this booking")
        })));
    }

    let base = estimate_base_amount(booking, &session.role);
    let discount = coupons
        .calculate_discount(code.clone(), base)
        .await
        .map_err(|e| CheckoutError::from_api(&e, &resource))?;
    if discount <= Decimal::ZERO {
        return Err(CheckoutError::Validation(format!(
            "Coupon {code} gives no discount on this booking"
        )));
    }

    coupons
        .apply(booking.id, code.clone())
        .await
        .map_err(|e| CheckoutError::from_api(&e, &resource))?;

    tracing::info!(%code, %discount, "Coupon applied");
    Ok(AppliedCoupon { code, discount })
}

/// Detach a coupon from `booking`
///
/// # Errors
///
/// Same classification as [`apply_coupon`].
pub async fn remove_coupon(
    booking: &Booking,
    code: &str,
    coupons: &dyn CouponApi,
) -> Result<(), CheckoutError> {
    let code = code.trim().to_string();
    if code.is_empty() {
        return Err(CheckoutError::Validation("Please enter a coupon code".to_string()));
    }
    coupons
        .remove(booking.id, code.clone())
        .await
        .map_err(|e| CheckoutError::from_api(&e, &format!("Coupon {code}")))?;
    tracing::info!(booking_id = %booking.id, %code, "Coupon removed");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::{ApiFuture, CouponValidation};
    use crate::booking::{AttachedCoupon, BookingId, ComboId};
    use crate::error::ApiError;
    use crate::session::ActorRole;
    use rust_decimal_macros::dec;

    /// Answers every discount calculation with the same result
    struct FixedDiscount(Result<Decimal, ApiError>);

    impl CouponApi for FixedDiscount {
        fn validate(&self, _: String, _: Option<ComboId>) -> ApiFuture<'_, CouponValidation> {
            Box::pin(async {
                Ok(CouponValidation {
                    valid: true,
                    message: None,
                })
            })
        }

        fn calculate_discount(&self, _: String, _: Decimal) -> ApiFuture<'_, Decimal> {
            let result = self.0.clone();
            Box::pin(async move { result })
        }

        fn apply(&self, _: BookingId, _: String) -> ApiFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }

        fn remove(&self, _: BookingId, _: String) -> ApiFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }
    }

    fn customer() -> Session {
        Session::anonymous()
    }

    fn agency() -> Session {
        Session {
            user_id: None,
            role: ActorRole::Agency,
        }
    }

    fn booking(quantity: u32, unit_price: Decimal, total: Decimal) -> Booking {
        Booking {
            quantity,
            unit_price,
            total_amount: total,
            ..Booking::new(BookingId(1))
        }
    }

    #[tokio::test]
    async fn attached_coupon_uses_list_price_difference() {
        let mut b = booking(2, dec!(100), dec!(180));
        b.attached_coupons.push(AttachedCoupon {
            coupon_id: Some(1),
            code: Some("TEN".into()),
        });
        let r = resolve_discount(&b, &customer(), &FixedDiscount(Ok(dec!(999)))).await;
        assert_eq!(r.original_total, dec!(200));
        assert_eq!(r.discount_amount, dec!(20));
        assert_eq!(r.applied_coupon_code.as_deref(), Some("TEN"));
        assert_eq!(r.source, DiscountSource::AttachedCoupon);
    }

    #[tokio::test]
    async fn attached_coupon_without_difference_is_no_discount() {
        let mut b = booking(2, dec!(100), dec!(200));
        b.attached_coupons.push(AttachedCoupon {
            coupon_id: Some(1),
            code: Some("TEN".into()),
        });
        let r = resolve_discount(&b, &customer(), &FixedDiscount(Ok(dec!(50)))).await;
        assert!(!r.is_applied());
        assert_eq!(r.original_total, dec!(200));
        assert_eq!(r.applied_coupon_code, None);
    }

    #[tokio::test]
    async fn notes_coupon_uses_endpoint_value() {
        let mut b = booking(2, dec!(100), dec!(200));
        b.applied_coupon_code = Some("SAVE".into());
        let r = resolve_discount(&b, &customer(), &FixedDiscount(Ok(dec!(30)))).await;
        assert_eq!(r.original_total, dec!(200));
        assert_eq!(r.discount_amount, dec!(30));
        assert_eq!(r.source, DiscountSource::NotesCoupon);
    }

    #[tokio::test]
    async fn notes_coupon_endpoint_failure_falls_back_to_difference() {
        let mut b = booking(2, dec!(100), dec!(170));
        b.applied_coupon_code = Some("SAVE".into());
        let failing = FixedDiscount(Err(ApiError::Network("refused".into())));
        let r = resolve_discount(&b, &customer(), &failing).await;
        assert_eq!(r.discount_amount, dec!(30));
        assert_eq!(r.source, DiscountSource::NotesCouponFallback);
    }

    #[tokio::test]
    async fn notes_coupon_non_positive_discount_is_ignored() {
        let mut b = booking(2, dec!(100), dec!(200));
        b.applied_coupon_code = Some("ZERO".into());
        let r = resolve_discount(&b, &customer(), &FixedDiscount(Ok(Decimal::ZERO))).await;
        assert!(!r.is_applied());
        assert_eq!(r.applied_coupon_code, None);
    }

    #[tokio::test]
    async fn agency_back_computes_original() {
        let b = booking(0, Decimal::ZERO, dec!(9700));
        let r = resolve_discount(&b, &agency(), &FixedDiscount(Ok(Decimal::ZERO))).await;
        assert_eq!(r.original_total, dec!(10000));
        assert_eq!(r.discount_amount, dec!(300));
        assert_eq!(r.source, DiscountSource::PartnerRole);
    }

    #[tokio::test]
    async fn agency_original_that_overflows_is_no_discount() {
        let b = booking(0, Decimal::ZERO, Decimal::MAX);
        let r = resolve_discount(&b, &agency(), &FixedDiscount(Ok(Decimal::ZERO))).await;
        assert_eq!(r, DiscountResolution::none(Decimal::MAX));
    }

    #[tokio::test]
    async fn attached_coupon_with_overflowing_list_price_is_no_discount() {
        let mut b = booking(2, Decimal::MAX, dec!(180));
        b.attached_coupons.push(AttachedCoupon {
            coupon_id: Some(1),
            code: Some("TEN".into()),
        });
        let r = resolve_discount(&b, &customer(), &FixedDiscount(Ok(dec!(10)))).await;
        assert_eq!(r, DiscountResolution::none(dec!(180)));
    }

    #[tokio::test]
    async fn no_discount_keeps_authoritative_total() {
        let b = booking(2, dec!(100), dec!(250));
        let r = resolve_discount(&b, &customer(), &FixedDiscount(Ok(dec!(10)))).await;
        assert_eq!(r, DiscountResolution::none(dec!(250)));
    }

    #[tokio::test]
    async fn apply_rejects_blank_code_without_calls() {
        let b = booking(1, dec!(100), dec!(100));
        let err = apply_coupon(&b, &customer(), "   ", &FixedDiscount(Ok(dec!(10))))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
    }

    #[tokio::test]
    async fn apply_rejects_zero_discount() {
        let b = booking(1, dec!(100), dec!(100));
        let err = apply_coupon(&b, &customer(), "NOPE", &FixedDiscount(Ok(Decimal::ZERO)))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(ref m) if m.contains("NOPE")));
    }
}
