//! Amount reconciliation
//!
//! Always recomputed from scratch for the current booking record; there is
//! no incremental update path.

use crate::addons::{AddOnSummary, AdditionalServiceLine, aggregate_add_ons};
use crate::api::{CouponApi, ServiceCatalog};
use crate::booking::Booking;
use crate::discount::{DiscountResolution, DiscountSource, resolve_discount};
use crate::error::CheckoutError;
use crate::session::Session;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The single authoritative payable amount of a booking
///
/// `final_payable = original_total - discount_amount + add_ons_total` holds for
/// every value built by [`ReconciledTotal::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledTotal {
    /// Amount before discount
    pub original_total: Decimal,
    /// Discount taken off the original
    pub discount_amount: Decimal,
    /// Sum of add-on lines
    pub add_ons_total: Decimal,
    /// What the customer pays
    pub final_payable: Decimal,
    /// Coupon shown with the discount
    pub applied_coupon_code: Option<String>,
    /// Rule that produced the discount
    pub discount_source: DiscountSource,
    /// Priced add-ons
    pub add_on_lines: Vec<AdditionalServiceLine>,
}

impl ReconciledTotal {
    /// Combine a discount resolution and an add-on summary
    ///
    /// An overflowing discount or add-on total is dropped.
    #[must_use]
    pub fn new(mut discount: DiscountResolution, mut add_ons: AddOnSummary) -> Self {
        let net = match discount.original_total.checked_sub(discount.discount_amount) {
            Some(net) => net,
            None => {
                tracing::warn!(original = %discount.original_total, "Discount overflows, ignoring it");
                discount = DiscountResolution::none(discount.original_total);
                discount.original_total
            },
        };
        let final_payable = match net.checked_add(add_ons.total) {
            Some(payable) => payable,
            None => {
                tracing::warn!(%net, add_ons = %add_ons.total, "Add-on total overflows, ignoring add-ons");
                add_ons = AddOnSummary::default();
                net
            },
        };
        Self {
            original_total: discount.original_total,
            discount_amount: discount.discount_amount,
            add_ons_total: add_ons.total,
            final_payable,
            applied_coupon_code: discount.applied_coupon_code,
            discount_source: discount.source,
            add_on_lines: add_ons.lines,
        }
    }

    /// The amount a payment intent may be created for
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::InvalidAmount`] when `final_payable` is not
    /// positive; payment is blocked.
    pub fn payable_amount(&self) -> Result<Decimal, CheckoutError> {
        if self.final_payable > Decimal::ZERO {
            Ok(self.final_payable)
        } else {
            Err(CheckoutError::InvalidAmount(self.final_payable))
        }
    }
}

/// Reconcile the payable amount of `booking`
///
/// Discount resolution and add-on aggregation are independent and run
/// concurrently; the total is computed once both finish.
#[tracing::instrument(skip_all, fields(booking_id = %booking.id))]
pub async fn reconcile(
    booking: &Booking,
    session: &Session,
    coupons: &dyn CouponApi,
    catalog: &dyn ServiceCatalog,
) -> ReconciledTotal {
    let (discount, add_ons) = futures::join!(
        resolve_discount(booking, session, coupons),
        aggregate_add_ons(&booking.additional_services, booking.combo_id, catalog),
    );
    let total = ReconciledTotal::new(discount, add_ons);
    tracing::debug!(
        original = %total.original_total,
        discount = %total.discount_amount,
        add_ons = %total.add_ons_total,
        payable = %total.final_payable,
        "Reconciled booking total"
    );
    total
}
