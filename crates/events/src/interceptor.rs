//! Dispatch interceptors.
//!
//! Interceptors run after registration checks and before driver resolution.
//! An interceptor that claims an event stops the dispatch: no driver is built
//! and the event is never executed. [`MockEvents`] is the interceptor used by
//! tests to assert that dispatches happened without their side effects.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value as JsonValue;

use crate::error::EventError;
use crate::event::Event;
use crate::registry::EventCtor;

pub trait DispatchInterceptor: Send + Sync {
    /// Returns `true` when the event was consumed and must not reach a driver.
    fn intercept(&self, event: &dyn Event) -> bool;
}

/// A dispatch captured by [`MockEvents`].
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
    pub name: String,
    pub payload: JsonValue,
}

#[derive(Debug, Default)]
struct MockState {
    mocked: HashSet<String>,
    dispatched: Vec<DispatchedEvent>,
}

/// Records dispatches of mocked event types instead of delivering them.
#[derive(Debug, Default)]
pub struct MockEvents {
    state: Mutex<MockState>,
}

impl MockEvents {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Intercept every future dispatch of `ctor`'s type.
    pub fn mock(&self, ctor: &EventCtor) {
        self.lock().mocked.insert(ctor.name().to_string());
    }

    pub fn is_mocked(&self, name: &str) -> bool {
        self.lock().mocked.contains(name)
    }

    pub fn dispatched(&self) -> Vec<DispatchedEvent> {
        self.lock().dispatched.clone()
    }

    /// Check that `ctor`'s type was dispatched while mocked.
    ///
    /// Without a predicate, returns `true`. With one, returns the predicate's
    /// verdict on the payload of the first captured dispatch of that type.
    pub fn assert_dispatched(
        &self,
        ctor: &EventCtor,
        predicate: Option<&dyn Fn(&JsonValue) -> bool>,
    ) -> Result<bool, EventError> {
        let captured = self
            .lock()
            .dispatched
            .iter()
            .find(|d| d.name == ctor.name())
            .cloned()
            .ok_or_else(|| EventError::not_dispatched(ctor.name()))?;

        Ok(predicate.is_none_or(|p| p(&captured.payload)))
    }

    /// Forget mocked types and captured dispatches.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.mocked.clear();
        state.dispatched.clear();
    }
}

impl DispatchInterceptor for MockEvents {
    fn intercept(&self, event: &dyn Event) -> bool {
        let mut state = self.lock();
        if !state.mocked.contains(event.name()) {
            return false;
        }
        state.dispatched.push(DispatchedEvent {
            name: event.name().to_string(),
            payload: event.payload(),
        });
        true
    }
}
