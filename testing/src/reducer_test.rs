//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use voyage_checkout_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use voyage_checkout_testing::ReducerTest;
///
/// ReducerTest::new(ConfirmationReducer::new())
///     .with_env(environment)
///     .given_state(ConfirmationState::default())
///     .when_action(start_action())
///     .then_state(|state| {
///         assert!(state.checked);
///     })
///     .then_effects(|effects| {
///         assertions::assert_has_future_effect(effects);
///     })
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    action: Option<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
    S: Clone,
    A: Clone,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            action: None,
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        // Execute reducer
        let effects = self.reducer.reduce(&mut state, action, &env);

        // Run state assertions
        for assertion in self.state_assertions {
            assertion(&state);
        }

        // Run effect assertions
        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use voyage_checkout_core::effect::Effect;

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.is_empty() || matches!(effects, [Effect::None]),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Future(_))),
            "Expected at least one Future effect, but none found"
        );
    }

    /// Assert that effects contain at least one `Delay` effect
    ///
    /// # Panics
    ///
    /// Panics if no `Delay` effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_delay_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Delay { .. })),
            "Expected at least one Delay effect, but none found"
        );
    }

    /// Return the action scheduled by the first `Delay` effect
    ///
    /// # Panics
    ///
    /// Panics if no `Delay` effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn delayed_action<A: Clone>(effects: &[Effect<A>]) -> (std::time::Duration, A) {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Delay { duration, action } => Some((*duration, (**action).clone())),
                _ => None,
            })
            .unwrap_or_else(|| panic!("Expected a Delay effect, but none found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use voyage_checkout_core::effect::Effect;
    use voyage_checkout_core::reducer::Reducer;

    #[derive(Clone, Debug, Default)]
    struct AttemptState {
        attempts: u32,
        done: bool,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum AttemptAction {
        Failed,
        Succeeded,
        Retry,
    }

    struct AttemptReducer;

    struct AttemptEnv {
        budget: u32,
    }

    impl Reducer for AttemptReducer {
        type State = AttemptState;
        type Action = AttemptAction;
        type Environment = AttemptEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> smallvec::SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                AttemptAction::Failed if state.attempts < env.budget => {
                    state.attempts += 1;
                    smallvec::smallvec![Effect::delay(Duration::from_secs(1), AttemptAction::Retry)]
                },
                AttemptAction::Failed | AttemptAction::Succeeded => {
                    state.done = true;
                    smallvec::smallvec![Effect::None]
                },
                AttemptAction::Retry => smallvec::smallvec![Effect::future(async { None })],
            }
        }
    }

    #[test]
    fn failure_within_budget_schedules_retry() {
        ReducerTest::new(AttemptReducer)
            .with_env(AttemptEnv { budget: 2 })
            .given_state(AttemptState::default())
            .when_action(AttemptAction::Failed)
            .then_state(|state| assert_eq!(state.attempts, 1))
            .then_effects(|effects| {
                let (after, action) = assertions::delayed_action(effects);
                assert_eq!(after, Duration::from_secs(1));
                assert_eq!(action, AttemptAction::Retry);
            })
            .run();
    }

    #[test]
    fn failure_past_budget_finishes() {
        ReducerTest::new(AttemptReducer)
            .with_env(AttemptEnv { budget: 2 })
            .given_state(AttemptState {
                attempts: 2,
                done: false,
            })
            .when_action(AttemptAction::Failed)
            .then_state(|state| assert!(state.done))
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[test]
    fn retry_dispatches_future() {
        ReducerTest::new(AttemptReducer)
            .with_env(AttemptEnv { budget: 1 })
            .given_state(AttemptState::default())
            .when_action(AttemptAction::Retry)
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }
}
