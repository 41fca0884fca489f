//! # Voyage Checkout Testing
//!
//! Test doubles and helpers for the checkout core and runtime.
//!
//! - [`MockBackend`]: scripted implementation of every collaborator trait
//! - [`FixedClock`]: deterministic time
//! - [`BookingBuilder`] and friends: test data
//! - [`ReducerTest`]: Given-When-Then reducer tests
//! - [`properties`]: proptest strategies for notes markers and money
//!
//! ## Example
//!
//! ```ignore
//! use voyage_checkout_testing::{MockBackend, BookingBuilder, fixtures::updated};
//!
//! #[tokio::test]
//! async fn confirms_on_first_attempt() {
//!     let backend = MockBackend::new()
//!         .with_booking(BookingBuilder::new(1).build())
//!         .script_check(PaymentHost::Primary, Ok(updated()));
//!     let poller = PaymentConfirmationPoller::new(environment(&backend));
//!     let state = poller.run(start_for(1)).await;
//!     assert!(state.phase.is_confirmed());
//! }
//! ```

use chrono::{DateTime, Utc};
use voyage_checkout_core::environment::Clock;

pub mod backend_mocks;
pub mod fixtures;
pub mod reducer_test;

/// Deterministic clocks
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// # Example
    ///
    /// ```
    /// use voyage_checkout_testing::mocks::FixedClock;
    /// use voyage_checkout_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Fixed clock at 2025-06-01 08:00:00 UTC
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-06-01T08:00:00Z")
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_default(),
        )
    }
}

/// Property-based testing strategies
pub mod properties {
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use voyage_checkout_core::notes::ServiceSelection;

    /// Non-negative money with two decimal places, up to one billion
    pub fn money() -> impl Strategy<Value = Decimal> {
        (0i64..100_000_000_000).prop_map(|cents| Decimal::new(cents, 2))
    }

    /// Strictly positive money
    pub fn positive_money() -> impl Strategy<Value = Decimal> {
        (1i64..100_000_000_000).prop_map(|cents| Decimal::new(cents, 2))
    }

    /// Valid add-on selections with distinct ids
    pub fn selections() -> impl Strategy<Value = Vec<ServiceSelection>> {
        proptest::collection::btree_map(1i64..1000, 1u32..20, 0..6).prop_map(|map| {
            map.into_iter()
                .map(|(service_id, quantity)| ServiceSelection {
                    service_id,
                    quantity,
                })
                .collect()
        })
    }

    /// Coupon codes as customers type them
    pub fn coupon_code() -> impl Strategy<Value = String> {
        "[A-Z0-9]{3,12}"
    }
}

/// Install a test tracing subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub use backend_mocks::{MockBackend, MockCall};
pub use fixtures::BookingBuilder;
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use voyage_checkout_core::notes::{encode_additional_services, parse_additional_services};

    #[test]
    fn test_clock_is_fixed() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-06-01T08:00:00+00:00");
    }

    proptest! {
        #[test]
        fn generated_selections_survive_the_marker(selections in properties::selections()) {
            let notes = format!("note {}", encode_additional_services(&selections));
            prop_assert_eq!(parse_additional_services(&notes), selections);
        }
    }
}
