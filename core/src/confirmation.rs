//! Payment confirmation after the provider redirects back
//!
//! The provider does not call us back, so the booking is reconciled with the
//! provider by polling the backend with the `orderCode` from the redirect.
//! The poll is a finite-state machine:
//!
//! ```text
//!  Idle ──Start──► Checking(1, primary) ──not paid──► Checking(2, primary) ─► Checking(3, primary)
//!                      │                                                           │
//!                      │ network failure                                exhausted  │
//!                      ▼                                                           ▼
//!                  Checking(1, fallback) ─► Checking(2, fallback) ─► Checking(3, fallback) ─► ExhaustedRetries
//!
//!  any Checking ──updated / paid──► Updated | AlreadyPaid ──► reload status ──► mark paid, record spend
//!  any Checking ──401/403──► Aborted
//! ```
//!
//! Probes are strictly sequential; the back-off between attempts is an
//! [`Effect::Delay`]. Both side effects after confirmation are idempotent and
//! best-effort.

use crate::api::{BookingApi, OrderCheck, PaymentApi, PaymentHost, PaymentStatus, UserApi};
use crate::booking::{BookingId, BookingStatus, UserId};
use crate::effect::Effect;
use crate::environment::Clock;
use crate::error::ApiError;
use crate::reducer::Reducer;
use crate::session::ProcessedBookings;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempt budget and back-off of the confirmation poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Attempts per host before moving on
    pub max_attempts_per_host: u32,
    /// Wait between attempts on the same host
    pub backoff: Duration,
    /// Whether the fallback host is tried at all
    pub fallback_enabled: bool,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_host: 3,
            backoff: Duration::from_secs(2),
            fallback_enabled: true,
        }
    }
}

/// Where the poll is
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ConfirmationPhase {
    /// Not started
    #[default]
    Idle,
    /// A probe is in flight or scheduled
    Checking {
        /// 1-based attempt on `host`
        attempt: u32,
        /// Host being probed
        host: PaymentHost,
    },
    /// The backend flipped the payment to paid during a probe
    Updated,
    /// The payment was already paid
    AlreadyPaid,
    /// Every attempt on every host came back unpaid
    ExhaustedRetries,
    /// The session is no longer authorized
    Aborted {
        /// Why polling stopped
        reason: String,
    },
}

impl ConfirmationPhase {
    /// Payment is confirmed
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, ConfirmationPhase::Updated | ConfirmationPhase::AlreadyPaid)
    }

    /// No further probes will run
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, ConfirmationPhase::Idle | ConfirmationPhase::Checking { .. })
    }

    /// Short label for logs and metrics
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            ConfirmationPhase::Idle => "idle",
            ConfirmationPhase::Checking { .. } => "checking",
            ConfirmationPhase::Updated => "updated",
            ConfirmationPhase::AlreadyPaid => "already_paid",
            ConfirmationPhase::ExhaustedRetries => "exhausted_retries",
            ConfirmationPhase::Aborted { .. } => "aborted",
        }
    }
}

/// What one probe found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Backend marked the payment paid during this call
    Updated,
    /// Payment already paid
    AlreadyPaid,
    /// Provider has not settled yet
    NotPaid,
    /// The probe failed
    Failed(ApiError),
}

impl From<Result<OrderCheck, ApiError>> for CheckOutcome {
    fn from(result: Result<OrderCheck, ApiError>) -> Self {
        match result {
            Ok(check) if check.was_updated => CheckOutcome::Updated,
            Ok(check) if check.is_paid => CheckOutcome::AlreadyPaid,
            Ok(_) => CheckOutcome::NotPaid,
            Err(error) => CheckOutcome::Failed(error),
        }
    }
}

/// Result of the `pending → paid` transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingUpdate {
    /// Status written
    MarkedPaid,
    /// Booking was already past pending; nothing written
    AlreadySettled,
    /// Write failed (logged)
    Failed(String),
}

/// Result of the loyalty spend update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendUpdate {
    /// Spend added to the user profile
    Recorded {
        /// Amount added
        amount: Decimal,
    },
    /// This booking was already counted in this session
    AlreadyProcessed,
    /// Nothing to record
    Skipped(String),
    /// Update failed (logged)
    Failed(String),
}

/// Confirmation state for one booking and order code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationState {
    /// Booking being confirmed
    pub booking_id: Option<BookingId>,
    /// Provider correlation key from the redirect
    pub order_code: Option<String>,
    /// User whose loyalty spend is updated
    pub user_id: Option<UserId>,
    /// Cached booking status, updated after a successful write
    pub booking_status: BookingStatus,
    /// Amount expected to have been paid
    pub expected_amount: Decimal,
    /// Poll phase
    pub phase: ConfirmationPhase,
    /// Set on the first `Start`; later starts are ignored
    pub checked: bool,
    /// Every probe dispatched, in order
    pub attempts: Vec<(PaymentHost, u32)>,
    /// Authoritative payment record, reloaded once after confirmation
    pub payment_status: Option<PaymentStatus>,
    /// Outcome of the booking status transition
    pub booking_update: Option<BookingUpdate>,
    /// Outcome of the loyalty spend update
    pub spend_update: Option<SpendUpdate>,
    /// When confirmation was observed
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Last probe failure
    pub last_error: Option<String>,
}

impl Default for ConfirmationState {
    fn default() -> Self {
        Self {
            booking_id: None,
            order_code: None,
            user_id: None,
            booking_status: BookingStatus::Pending,
            expected_amount: Decimal::ZERO,
            phase: ConfirmationPhase::Idle,
            checked: false,
            attempts: Vec::new(),
            payment_status: None,
            booking_update: None,
            spend_update: None,
            confirmed_at: None,
            last_error: None,
        }
    }
}

impl ConfirmationState {
    /// Number of probes dispatched against `host`
    #[must_use]
    pub fn attempts_on(&self, host: PaymentHost) -> usize {
        self.attempts.iter().filter(|(h, _)| *h == host).count()
    }
}

/// Inputs to the confirmation state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationAction {
    /// Begin polling; ignored after the first time
    Start {
        /// Booking being confirmed
        booking_id: BookingId,
        /// Provider correlation key
        order_code: String,
        /// User whose loyalty spend is updated
        user_id: Option<UserId>,
        /// Booking status as last loaded
        booking_status: BookingStatus,
        /// Reconciled amount, used when the payment record has none
        expected_amount: Decimal,
    },
    /// Back-off elapsed; probe again
    RetryCheck {
        /// Host to probe
        host: PaymentHost,
        /// Attempt number of the new probe
        attempt: u32,
    },
    /// A probe finished
    CheckCompleted {
        /// Host probed
        host: PaymentHost,
        /// Attempt number of the probe
        attempt: u32,
        /// What it found
        outcome: CheckOutcome,
    },
    /// The payment record was reloaded (None when the reload failed)
    PaymentStatusLoaded {
        /// Reloaded record
        status: Option<PaymentStatus>,
    },
    /// The booking status transition finished
    BookingStatusUpdated {
        /// Outcome
        update: BookingUpdate,
    },
    /// The loyalty spend update finished
    SpendRecorded {
        /// Outcome
        update: SpendUpdate,
    },
}

/// Dependencies of the confirmation state machine
#[derive(Clone)]
pub struct ConfirmationEnvironment {
    /// Payment endpoints
    pub payments: Arc<dyn PaymentApi>,
    /// Booking endpoints
    pub bookings: Arc<dyn BookingApi>,
    /// User endpoints
    pub users: Arc<dyn UserApi>,
    /// Session-scoped guard for the loyalty update
    pub processed: Arc<dyn ProcessedBookings>,
    /// Clock for the confirmation timestamp
    pub clock: Arc<dyn Clock>,
    /// Attempt budget
    pub policy: PollPolicy,
}

/// Move `booking_id` from pending to paid unless it is already settled
///
/// Calling this for a settled booking performs no write.
pub async fn mark_booking_paid(
    bookings: &dyn BookingApi,
    booking_id: BookingId,
    current: &BookingStatus,
) -> BookingUpdate {
    if current.is_settled() {
        debug!(%booking_id, status = current.as_str(), "Booking already settled, not updating status");
        return BookingUpdate::AlreadySettled;
    }
    match bookings.update_status(booking_id, BookingStatus::Paid).await {
        Ok(()) => {
            info!(%booking_id, "Booking marked paid");
            BookingUpdate::MarkedPaid
        },
        Err(error) => {
            warn!(%booking_id, %error, "Failed to mark booking paid");
            BookingUpdate::Failed(error.to_string())
        },
    }
}

/// Add `amount` to the user's total spent, once per booking
///
/// Read-then-append on `processed`; the booking is only recorded after the
/// update succeeds, so a failed update may be retried on a later load.
pub async fn record_loyalty_spend(
    users: &dyn UserApi,
    processed: &dyn ProcessedBookings,
    user_id: Option<UserId>,
    booking_id: BookingId,
    amount: Decimal,
) -> SpendUpdate {
    if processed.has_processed(booking_id) {
        debug!(%booking_id, "Loyalty spend already recorded for booking");
        return SpendUpdate::AlreadyProcessed;
    }
    let Some(user_id) = user_id else {
        return SpendUpdate::Skipped("no signed-in user".to_string());
    };
    if amount <= Decimal::ZERO {
        return SpendUpdate::Skipped("no amount to record".to_string());
    }
    match users.update_spent(user_id, amount).await {
        Ok(()) => {
            processed.mark_processed(booking_id);
            info!(%booking_id, %user_id, %amount, "Loyalty spend recorded");
            SpendUpdate::Recorded { amount }
        },
        Err(error) => {
            warn!(%booking_id, %user_id, %error, "Failed to record loyalty spend");
            SpendUpdate::Failed(error.to_string())
        },
    }
}

/// The confirmation state machine
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfirmationReducer;

impl ConfirmationReducer {
    /// Creates a new `ConfirmationReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn probe(
        state: &mut ConfirmationState,
        env: &ConfirmationEnvironment,
        host: PaymentHost,
        attempt: u32,
    ) -> Effect<ConfirmationAction> {
        state.phase = ConfirmationPhase::Checking { attempt, host };
        state.attempts.push((host, attempt));
        let Some(order_code) = state.order_code.clone() else {
            return Effect::None;
        };
        debug!(%host, attempt, %order_code, "Checking payment by order code");
        let payments = Arc::clone(&env.payments);
        Effect::future(async move {
            let result = payments.check_by_order_code(host, order_code).await;
            Some(ConfirmationAction::CheckCompleted {
                host,
                attempt,
                outcome: CheckOutcome::from(result),
            })
        })
    }

    /// Primary host is done; move to the fallback host or give up
    fn leave_primary(
        state: &mut ConfirmationState,
        env: &ConfirmationEnvironment,
    ) -> Effect<ConfirmationAction> {
        if env.policy.fallback_enabled {
            info!("Switching payment confirmation to fallback host");
            Self::probe(state, env, PaymentHost::Fallback, 1)
        } else {
            Self::exhaust(state)
        }
    }

    fn exhaust(state: &mut ConfirmationState) -> Effect<ConfirmationAction> {
        warn!(
            attempts = state.attempts.len(),
            order_code = state.order_code.as_deref().unwrap_or_default(),
            "Payment confirmation retries exhausted"
        );
        state.phase = ConfirmationPhase::ExhaustedRetries;
        Effect::None
    }

    fn confirm(
        state: &mut ConfirmationState,
        env: &ConfirmationEnvironment,
        phase: ConfirmationPhase,
    ) -> Effect<ConfirmationAction> {
        info!(phase = phase.label(), "Payment confirmed");
        state.phase = phase;
        state.confirmed_at = Some(env.clock.now());
        let Some(booking_id) = state.booking_id else {
            return Effect::None;
        };
        let payments = Arc::clone(&env.payments);
        Effect::future(async move {
            let status = match payments.payment_status(booking_id).await {
                Ok(status) => Some(status),
                Err(error) => {
                    warn!(%booking_id, %error, "Failed to reload payment status");
                    None
                },
            };
            Some(ConfirmationAction::PaymentStatusLoaded { status })
        })
    }

    fn side_effects(
        state: &ConfirmationState,
        env: &ConfirmationEnvironment,
    ) -> Effect<ConfirmationAction> {
        let Some(booking_id) = state.booking_id else {
            return Effect::None;
        };

        let bookings = Arc::clone(&env.bookings);
        let current = state.booking_status.clone();
        let mark_paid = Effect::future(async move {
            let update = mark_booking_paid(bookings.as_ref(), booking_id, &current).await;
            Some(ConfirmationAction::BookingStatusUpdated { update })
        });

        let amount = state
            .payment_status
            .as_ref()
            .map(|status| status.amount)
            .filter(|amount| *amount > Decimal::ZERO)
            .unwrap_or(state.expected_amount);
        let users = Arc::clone(&env.users);
        let processed = Arc::clone(&env.processed);
        let user_id = state.user_id;
        let record_spend = Effect::future(async move {
            let update =
                record_loyalty_spend(users.as_ref(), processed.as_ref(), user_id, booking_id, amount)
                    .await;
            Some(ConfirmationAction::SpendRecorded { update })
        });

        Effect::Sequential(vec![mark_paid, record_spend])
    }
}

impl Reducer for ConfirmationReducer {
    type State = ConfirmationState;
    type Action = ConfirmationAction;
    type Environment = ConfirmationEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            ConfirmationAction::Start {
                booking_id,
                order_code,
                user_id,
                booking_status,
                expected_amount,
            } => {
                if state.checked {
                    debug!(%booking_id, "Payment confirmation already ran for this load");
                    return smallvec![Effect::None];
                }
                state.checked = true;
                state.booking_id = Some(booking_id);
                state.user_id = user_id;
                state.booking_status = booking_status;
                state.expected_amount = expected_amount;

                let order_code = order_code.trim().to_string();
                if order_code.is_empty() {
                    state.phase = ConfirmationPhase::Aborted {
                        reason: "missing order code".to_string(),
                    };
                    return smallvec![Effect::None];
                }
                state.order_code = Some(order_code);
                smallvec![Self::probe(state, env, PaymentHost::Primary, 1)]
            },

            ConfirmationAction::RetryCheck { host, attempt } => match state.phase {
                ConfirmationPhase::Checking {
                    attempt: current,
                    host: current_host,
                } if current_host == host && current + 1 == attempt => {
                    smallvec![Self::probe(state, env, host, attempt)]
                },
                _ => smallvec![Effect::None],
            },

            ConfirmationAction::CheckCompleted {
                host,
                attempt,
                outcome,
            } => {
                if state.phase != (ConfirmationPhase::Checking { attempt, host }) {
                    debug!(%host, attempt, "Ignoring stale payment check result");
                    return smallvec![Effect::None];
                }
                match outcome {
                    CheckOutcome::Updated => {
                        smallvec![Self::confirm(state, env, ConfirmationPhase::Updated)]
                    },
                    CheckOutcome::AlreadyPaid => {
                        smallvec![Self::confirm(state, env, ConfirmationPhase::AlreadyPaid)]
                    },
                    CheckOutcome::Failed(error) if error.is_authorization() => {
                        warn!(%error, "Payment confirmation no longer authorized");
                        state.last_error = Some(error.to_string());
                        state.phase = ConfirmationPhase::Aborted {
                            reason: error.to_string(),
                        };
                        smallvec![Effect::None]
                    },
                    CheckOutcome::Failed(error)
                        if error.is_network_class() && host == PaymentHost::Primary =>
                    {
                        warn!(%error, attempt, "Primary host unreachable");
                        state.last_error = Some(error.to_string());
                        smallvec![Self::leave_primary(state, env)]
                    },
                    outcome => {
                        if let CheckOutcome::Failed(error) = &outcome {
                            warn!(%host, attempt, %error, "Payment check failed");
                            state.last_error = Some(error.to_string());
                        }
                        if attempt < env.policy.max_attempts_per_host {
                            smallvec![Effect::delay(
                                env.policy.backoff,
                                ConfirmationAction::RetryCheck {
                                    host,
                                    attempt: attempt + 1,
                                },
                            )]
                        } else if host == PaymentHost::Primary {
                            smallvec![Self::leave_primary(state, env)]
                        } else {
                            smallvec![Self::exhaust(state)]
                        }
                    },
                }
            },

            ConfirmationAction::PaymentStatusLoaded { status } => {
                if !state.phase.is_confirmed() || state.booking_update.is_some() {
                    return smallvec![Effect::None];
                }
                state.payment_status = status;
                smallvec![Self::side_effects(state, env)]
            },

            ConfirmationAction::BookingStatusUpdated { update } => {
                if update == BookingUpdate::MarkedPaid {
                    state.booking_status = BookingStatus::Paid;
                }
                state.booking_update = Some(update);
                smallvec![Effect::None]
            },

            ConfirmationAction::SpendRecorded { update } => {
                state.spend_update = Some(update);
                smallvec![Effect::None]
            },
        }
    }
}
