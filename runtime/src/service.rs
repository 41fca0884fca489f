//! Checkout service facade
//!
//! Wires the core operations to concrete collaborators. Every operation takes
//! the session explicitly and reloads the booking, so amounts are always
//! reconciled from the current record.

use crate::poller::{ConfirmationRequest, PaymentConfirmationPoller};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use voyage_checkout_core::api::{BookingApi, CouponApi, PaymentApi, ServiceCatalog, UserApi};
use voyage_checkout_core::booking::{Booking, BookingId};
use voyage_checkout_core::confirmation::{ConfirmationEnvironment, ConfirmationState, PollPolicy};
use voyage_checkout_core::discount;
use voyage_checkout_core::environment::{Clock, SystemClock};
use voyage_checkout_core::error::CheckoutError;
use voyage_checkout_core::intent::{self, CheckoutRedirect, truncate_description};
use voyage_checkout_core::reconcile::{ReconciledTotal, reconcile};
use voyage_checkout_core::session::{ProcessedBookings, Session};

/// A booking with its reconciled total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Booking as loaded
    pub booking: Booking,
    /// Payable breakdown
    pub total: ReconciledTotal,
}

/// Checkout operations over injected collaborators
#[derive(Clone)]
pub struct CheckoutService {
    bookings: Arc<dyn BookingApi>,
    coupons: Arc<dyn CouponApi>,
    catalog: Arc<dyn ServiceCatalog>,
    payments: Arc<dyn PaymentApi>,
    users: Arc<dyn UserApi>,
    processed: Arc<dyn ProcessedBookings>,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
}

impl CheckoutService {
    /// Build a service over one backend implementing every collaborator trait
    #[must_use]
    pub fn new<B>(backend: Arc<B>, processed: Arc<dyn ProcessedBookings>, policy: PollPolicy) -> Self
    where
        B: BookingApi + CouponApi + ServiceCatalog + PaymentApi + UserApi + 'static,
    {
        Self {
            bookings: backend.clone(),
            coupons: backend.clone(),
            catalog: backend.clone(),
            payments: backend.clone(),
            users: backend,
            processed,
            clock: Arc::new(SystemClock),
            policy,
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Load and normalize a booking
    ///
    /// # Errors
    ///
    /// Classified [`CheckoutError`] for the booking request.
    pub async fn load_booking(&self, booking_id: BookingId) -> Result<Booking, CheckoutError> {
        self.bookings
            .get_booking(booking_id)
            .await
            .map_err(|e| CheckoutError::from_api(&e, &format!("Booking {booking_id}")))
    }

    /// Reconcile the payable amount of a booking
    ///
    /// # Errors
    ///
    /// Only loading the booking can fail; discount and add-on lookups degrade.
    #[tracing::instrument(skip(self, session), fields(role = %session.role))]
    pub async fn quote(&self, booking_id: BookingId, session: &Session) -> Result<Quote, CheckoutError> {
        let booking = self.load_booking(booking_id).await?;
        Ok(self.quote_booking(booking, session).await)
    }

    async fn quote_booking(&self, booking: Booking, session: &Session) -> Quote {
        let total = reconcile(&booking, session, self.coupons.as_ref(), self.catalog.as_ref()).await;
        Quote { booking, total }
    }

    /// Open a checkout session for the reconciled amount
    ///
    /// The description defaults to `Booking #<id>` and is cut to the
    /// provider limit.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::InvalidAmount`] when nothing is payable, otherwise the
    /// classified intent failure.
    #[tracing::instrument(skip(self, session))]
    pub async fn begin_payment(
        &self,
        booking_id: BookingId,
        session: &Session,
        description: Option<&str>,
    ) -> Result<CheckoutRedirect, CheckoutError> {
        let quote = self.quote(booking_id, session).await?;
        let amount = quote.total.payable_amount()?;
        let description = truncate_description(
            &description.map_or_else(|| format!("Booking #{booking_id}"), str::to_string),
        );
        let result = intent::create_intent(self.payments.as_ref(), booking_id, amount, &description).await;
        match &result {
            Ok(_) => metrics::counter!("checkout.intent.created").increment(1),
            Err(error) => {
                metrics::counter!("checkout.intent.failed", "class" => format!("{:?}", error.class()))
                    .increment(1);
            },
        }
        result
    }

    /// Apply a coupon and return the re-reconciled quote
    ///
    /// # Errors
    ///
    /// See [`discount::apply_coupon`].
    #[tracing::instrument(skip(self, session))]
    pub async fn apply_coupon(
        &self,
        booking_id: BookingId,
        session: &Session,
        code: &str,
    ) -> Result<Quote, CheckoutError> {
        let booking = self.load_booking(booking_id).await?;
        discount::apply_coupon(&booking, session, code, self.coupons.as_ref()).await?;
        self.quote(booking_id, session).await
    }

    /// Remove a coupon and return the re-reconciled quote
    ///
    /// Without an explicit code the coupon currently on the booking is removed.
    /// A notes marker the backend left behind for the removed code is not
    /// reapplied to the returned quote.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::Validation`] when the booking carries no coupon, or
    /// the classified removal failure.
    #[tracing::instrument(skip(self, session))]
    pub async fn remove_coupon(
        &self,
        booking_id: BookingId,
        session: &Session,
        code: Option<&str>,
    ) -> Result<Quote, CheckoutError> {
        let booking = self.load_booking(booking_id).await?;
        let code = code
            .map(str::to_string)
            .or_else(|| booking.applied_coupon_code.clone())
            .or_else(|| booking.attached_coupon_code().map(str::to_string))
            .ok_or_else(|| CheckoutError::Validation("No coupon is applied to this booking".to_string()))?;
        discount::remove_coupon(&booking, &code, self.coupons.as_ref()).await?;

        let mut booking = self.load_booking(booking_id).await?;
        if booking.clear_coupon_marker(&code) {
            tracing::warn!(%booking_id, %code, "Coupon marker still in the booking notes after removal");
        }
        Ok(self.quote_booking(booking, session).await)
    }

    /// A poller for one page load
    #[must_use]
    pub fn poller(&self) -> PaymentConfirmationPoller {
        PaymentConfirmationPoller::new(ConfirmationEnvironment {
            payments: Arc::clone(&self.payments),
            bookings: Arc::clone(&self.bookings),
            users: Arc::clone(&self.users),
            processed: Arc::clone(&self.processed),
            clock: Arc::clone(&self.clock),
            policy: self.policy,
        })
    }

    /// Confirm a payment after the provider redirect
    ///
    /// # Errors
    ///
    /// Only loading the booking can fail; polling outcomes are reported in
    /// the returned state.
    #[tracing::instrument(skip(self, session))]
    pub async fn confirm_payment(
        &self,
        booking_id: BookingId,
        session: &Session,
        order_code: &str,
    ) -> Result<ConfirmationState, CheckoutError> {
        let quote = self.quote(booking_id, session).await?;
        let request = ConfirmationRequest {
            booking_id,
            order_code: order_code.to_string(),
            user_id: session.user_id.or(quote.booking.user_id),
            booking_status: quote.booking.status.clone(),
            expected_amount: quote.total.final_payable,
        };
        Ok(self.poller().run(request).await)
    }
}
