//! # Voyage Checkout Runtime
//!
//! Runtime for the checkout core: the [`Store`] that drives a reducer and its
//! effects, the [`PaymentConfirmationPoller`] built on it, configuration, the
//! file-backed processed-booking guard and the [`CheckoutService`] facade.
//!
//! ## Core Components
//!
//! - **Store**: owns state, runs the reducer and executes effects, feeding
//!   produced actions back until the machine is quiescent
//! - **Poller**: one confirmation run per loaded page
//! - **Service**: load, quote, pay, coupon and confirm operations
//!
//! ## Example
//!
//! ```ignore
//! use voyage_checkout_runtime::{CheckoutConfig, CheckoutService};
//!
//! let config = CheckoutConfig::from_env()?;
//! let service = CheckoutService::new(backend, processed, config.poll_policy());
//! let quote = service.quote(BookingId(42), &session).await?;
//! ```

use futures::future::{BoxFuture, join_all};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use voyage_checkout_core::{effect::Effect, reducer::Reducer};

pub mod config;
pub mod poller;
pub mod processed;
pub mod service;

pub use config::{CheckoutConfig, ConfigError};
pub use poller::{ConfirmationRequest, PaymentConfirmationPoller};
pub use processed::FileProcessedBookings;
pub use service::{CheckoutService, Quote};
pub use store::Store;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// Returned by `send()` after `shutdown()`; actions fed back by
        /// in-flight effects are dropped the same way.
        #[error("Store is shutting down")]
        ShutdownInProgress,
    }
}

pub use error::StoreError;

/// The Store runtime
pub mod store {
    use super::{Arc, AtomicBool, BoxFuture, Effect, Ordering, Reducer, RwLock, StoreError, join_all};

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent reads)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// `send` drives the action and everything it causes to completion:
    /// futures are awaited, delays slept, and every produced action is reduced
    /// in turn. It returns once no effect is outstanding.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
            }
        }

        /// Send an action and run everything it causes
        ///
        /// The reducer runs under the write lock; the lock is released before
        /// any effect executes.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError> {
            self.dispatch(action).await
        }

        /// Stop accepting actions
        ///
        /// Effects already running finish, but the actions they produce are
        /// dropped, which ends any feedback loop (a pending back-off included).
        pub fn shutdown(&self) {
            tracing::info!("Store shutting down");
            self.shutdown.store(true, Ordering::Release);
        }

        /// True once `shutdown` was called
        #[must_use]
        pub fn is_shut_down(&self) -> bool {
            self.shutdown.load(Ordering::Acquire)
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let phase = store.state(|s| s.phase.clone()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        fn dispatch(&self, action: A) -> BoxFuture<'_, Result<(), StoreError>> {
            Box::pin(async move {
                if self.is_shut_down() {
                    tracing::debug!("Rejected action: store is shutting down");
                    metrics::counter!("checkout.store.rejected_actions").increment(1);
                    return Err(StoreError::ShutdownInProgress);
                }

                let effects = {
                    let mut state = self.state.write().await;
                    self.reducer.reduce(&mut *state, action, &self.environment)
                };
                tracing::trace!("Reducer returned {} effects", effects.len());

                join_all(effects.into_iter().map(|effect| self.execute(effect))).await;
                Ok(())
            })
        }

        /// Feed an action produced by an effect back in
        async fn feed_back(&self, action: A) {
            if let Err(error) = self.dispatch(action).await {
                tracing::debug!(%error, "Dropped action produced by effect");
            }
        }

        fn execute(&self, effect: Effect<A>) -> BoxFuture<'_, ()> {
            Box::pin(async move {
                match effect {
                    Effect::None => {
                        metrics::counter!("checkout.effects.executed", "type" => "none").increment(1);
                    },
                    Effect::Future(fut) => {
                        metrics::counter!("checkout.effects.executed", "type" => "future").increment(1);
                        if let Some(action) = fut.await {
                            self.feed_back(action).await;
                        }
                    },
                    Effect::Delay { duration, action } => {
                        tracing::trace!("Executing Effect::Delay (duration: {:?})", duration);
                        metrics::counter!("checkout.effects.executed", "type" => "delay").increment(1);
                        tokio::time::sleep(duration).await;
                        self.feed_back(*action).await;
                    },
                    Effect::Parallel(effects) => {
                        metrics::counter!("checkout.effects.executed", "type" => "parallel").increment(1);
                        join_all(effects.into_iter().map(|effect| self.execute(effect))).await;
                    },
                    Effect::Sequential(effects) => {
                        metrics::counter!("checkout.effects.executed", "type" => "sequential").increment(1);
                        for effect in effects {
                            self.execute(effect).await;
                        }
                    },
                }
            })
        }
    }
}
