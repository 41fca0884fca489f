//! # Voyage Checkout Core
//!
//! Amount reconciliation and payment confirmation for the Voyage travel
//! booking checkout.
//!
//! The crate is the functional core of the checkout: it turns a booking record
//! into one authoritative payable amount and drives the payment provider's
//! eventually-consistent confirmation as an explicit state machine. Every
//! collaborator (the booking, coupon, catalog, payment and user services, the
//! processed-booking guard, the clock) is injected through a trait, so the
//! whole pipeline is testable without a network or a browser.
//!
//! ## Components
//!
//! - [`pricing`]: base amount estimate from unit price, quantity and role
//! - [`discount`]: coupon recovery and discount derivation with arithmetic fallbacks
//! - [`addons`]: additional-service line items from the notes marker
//! - [`reconcile`]: combines the above into a [`reconcile::ReconciledTotal`]
//! - [`intent`]: checkout-session creation and error classification
//! - [`confirmation`]: the redirect-back polling state machine
//!
//! ## Data flow
//!
//! ```text
//! raw JSON ──► normalize_booking ──► Booking
//!                                      │
//!                 ┌────────────────────┼────────────────────┐
//!                 ▼                    ▼                    │
//!          resolve_discount     aggregate_add_ons           │
//!          (uses pricing)              │                    │
//!                 └────────┬───────────┘                    │
//!                          ▼                                │
//!                      reconcile ──► create_intent ──► provider redirect
//!                                                           │
//!                    ConfirmationReducer ◄── orderCode ◄────┘
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use rust_decimal::Decimal;
pub use smallvec::{SmallVec, smallvec};

pub mod addons;
pub mod api;
pub mod booking;
pub mod confirmation;
pub mod discount;
pub mod error;
pub mod intent;
pub mod notes;
pub mod pricing;
pub mod reconcile;
pub mod session;

/// Reducer module - the state machine abstraction
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// The confirmation poller is written as one, which keeps its attempt counting
/// and host selection free of I/O and directly testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for state transitions
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// Updates state in place and returns effect descriptions for the
        /// runtime to execute. Actions produced by effects are fed back in.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - side effect descriptions
///
/// Effects are values returned from reducers. They are executed by the
/// runtime's `Store`, never by the reducer itself.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially, each one finishing before the next starts
        Sequential(Vec<Effect<Action>>),

        /// Scheduled resumption (back-off between polling attempts)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Wrap an async computation as an effect
        pub fn future<F>(future: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(future))
        }

        /// Schedule `action` to be dispatched after `duration`
        #[must_use]
        pub fn delay(duration: Duration, action: Action) -> Self {
            Effect::Delay {
                duration,
                action: Box::new(action),
            }
        }

        /// Returns true for `Effect::None`
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Environment module - injected time source
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use std::time::Duration;

    #[test]
    fn delay_effect_debug_includes_duration() {
        let effect: Effect<u8> = Effect::delay(Duration::from_secs(2), 7);
        let rendered = format!("{effect:?}");
        assert!(rendered.contains("Effect::Delay"));
        assert!(rendered.contains("2s"));
    }

    #[test]
    fn none_effect_is_none() {
        assert!(Effect::<u8>::None.is_none());
        assert!(!Effect::future(async { Some(1u8) }).is_none());
    }
}
