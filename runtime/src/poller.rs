//! Payment confirmation poller
//!
//! One poller per loaded checkout page: it runs the confirmation state machine
//! once and then only reports the result.

use crate::store::Store;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use voyage_checkout_core::api::PaymentHost;
use voyage_checkout_core::booking::{BookingId, BookingStatus, UserId};
use voyage_checkout_core::confirmation::{
    ConfirmationAction, ConfirmationEnvironment, ConfirmationReducer, ConfirmationState,
};

/// What the redirect back from the provider tells us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    /// Booking that was paid
    pub booking_id: BookingId,
    /// Provider correlation key from the redirect URL
    pub order_code: String,
    /// Signed-in user
    pub user_id: Option<UserId>,
    /// Booking status as last loaded
    pub booking_status: BookingStatus,
    /// Reconciled payable amount
    pub expected_amount: Decimal,
}

impl From<ConfirmationRequest> for ConfirmationAction {
    fn from(request: ConfirmationRequest) -> Self {
        ConfirmationAction::Start {
            booking_id: request.booking_id,
            order_code: request.order_code,
            user_id: request.user_id,
            booking_status: request.booking_status,
            expected_amount: request.expected_amount,
        }
    }
}

/// Drives [`ConfirmationReducer`] for one page load
pub struct PaymentConfirmationPoller {
    store: Store<ConfirmationState, ConfirmationAction, ConfirmationEnvironment, ConfirmationReducer>,
    started: AtomicBool,
}

impl PaymentConfirmationPoller {
    /// Create an idle poller
    #[must_use]
    pub fn new(environment: ConfirmationEnvironment) -> Self {
        Self {
            store: Store::new(
                ConfirmationState::default(),
                ConfirmationReducer::new(),
                environment,
            ),
            started: AtomicBool::new(false),
        }
    }

    /// Confirm the payment and apply the follow-up side effects
    ///
    /// Probes run strictly one after another with the configured back-off.
    /// Only the first call does anything; later calls return the current
    /// state.
    #[tracing::instrument(skip_all, fields(booking_id = %request.booking_id, order_code = %request.order_code))]
    pub async fn run(&self, request: ConfirmationRequest) -> ConfirmationState {
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("Payment confirmation already started for this page");
            return self.snapshot().await;
        }

        if let Err(error) = self.store.send(request.into()).await {
            tracing::debug!(%error, "Payment confirmation cancelled before it started");
        }

        let state = self.snapshot().await;
        metrics::counter!("checkout.confirmation.outcome", "outcome" => state.phase.label())
            .increment(1);
        for host in [PaymentHost::Primary, PaymentHost::Fallback] {
            let attempts = u64::try_from(state.attempts_on(host)).unwrap_or(u64::MAX);
            if attempts > 0 {
                metrics::counter!("checkout.confirmation.attempts", "host" => host.to_string())
                    .increment(attempts);
            }
        }
        tracing::info!(
            phase = state.phase.label(),
            attempts = state.attempts.len(),
            "Payment confirmation finished"
        );
        state
    }

    /// Stop polling; a scheduled retry is dropped
    pub fn cancel(&self) {
        self.store.shutdown();
    }

    /// Current state
    pub async fn snapshot(&self) -> ConfirmationState {
        self.store.state(Clone::clone).await
    }
}
