//! Event service: configuration, routing and subscriber fan-out.
//!
//! ## Dispatch pipeline
//!
//! ```text
//! dispatch(event)
//!   ↓
//! 1. config registered?            → else EventError::Dispatch
//! 2. event name registered?        → else EventError::Dispatch
//! 3. interceptors (mocks)          → consumed: record and stop
//! 4. resolve driver name           (override → event → default driver)
//! 5. driver registered?            → else EventError::Dispatch
//! 6. build driver, driver.dispatch(event)
//! 7. listener event?               → dispatch each subscriber with the same payload
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::config::EventConfig;
use crate::driver::{DriverConfig, DriverConstructor, EventDriver};
use crate::error::EventError;
use crate::event::Event;
use crate::interceptor::{DispatchInterceptor, MockEvents};
use crate::registry::{EventCtor, EventRegistry};

type DispatchFuture<'a> = Pin<Box<dyn Future<Output = Result<(), EventError>> + Send + 'a>>;

#[derive(Debug, Default)]
struct ServiceState {
    config_registered: bool,
    drivers: HashMap<String, DriverConfig>,
    events: HashMap<String, EventCtor>,
    listeners: HashMap<String, Vec<EventCtor>>,
    /// Survive `register_config` rebuilds.
    option_overrides: HashMap<String, JsonValue>,
}

#[derive(Default)]
struct Interceptors {
    chain: Vec<Arc<dyn DispatchInterceptor>>,
    mocks_installed: bool,
}

/// Single source of truth for event routing.
///
/// Indices are written at boot by [`EventService::register_config`] and read
/// on every dispatch. Changing registrations while dispatches are in flight is
/// unsupported.
pub struct EventService {
    config: EventConfig,
    registry: Arc<EventRegistry>,
    state: RwLock<ServiceState>,
    interceptors: RwLock<Interceptors>,
    mocks: Arc<MockEvents>,
}

impl core::fmt::Debug for EventService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventService")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl EventService {
    pub fn new(config: EventConfig, registry: Arc<EventRegistry>) -> Self {
        Self {
            config,
            registry,
            state: RwLock::new(ServiceState::default()),
            interceptors: RwLock::new(Interceptors::default()),
            mocks: Arc::new(MockEvents::new()),
        }
    }

    fn state(&self) -> RwLockReadGuard<'_, ServiceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, ServiceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EventConfig {
        &self.config
    }

    /// Rebuild driver, event and listener indices and close the registry.
    ///
    /// Must run before any dispatch. Running it again picks up types
    /// registered since.
    pub fn register_config(&self) {
        let drivers = self.config.drivers.clone();
        let events: HashMap<String, EventCtor> = self
            .registry
            .events()
            .into_iter()
            .map(|ctor| (ctor.name().to_string(), ctor))
            .collect();
        let listeners: HashMap<String, Vec<EventCtor>> = self
            .config
            .listeners
            .iter()
            .map(|(name, cfg)| (name.clone(), cfg.subscribers.clone()))
            .collect();

        {
            let mut state = self.state_mut();
            state.drivers = drivers;
            state.events = events;
            state.listeners = listeners;
            state.config_registered = true;
            info!(
                drivers = state.drivers.len(),
                events = state.events.len(),
                listeners = state.listeners.len(),
                "event config registered"
            );
        }

        self.registry.set_initialized();
    }

    pub fn is_config_registered(&self) -> bool {
        self.state().config_registered
    }

    /// Register an event type after boot, into the registry and the live index.
    pub fn register_event(&self, ctor: EventCtor) {
        self.registry.register(ctor.clone());
        self.state_mut().events.insert(ctor.name().to_string(), ctor);
    }

    /// Constructor for a registered event name (used to replay work items).
    pub fn event_ctor_by_name(&self, name: &str) -> Option<EventCtor> {
        self.state().events.get(name).cloned()
    }

    pub fn subscribers(&self, event_name: &str) -> Vec<EventCtor> {
        self.state()
            .listeners
            .get(event_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn driver_options_by_name(&self, name: &str) -> Option<JsonValue> {
        let state = self.state();
        if let Some(options) = state.option_overrides.get(name) {
            return Some(options.clone());
        }
        state
            .drivers
            .get(name)
            .or_else(|| self.config.drivers.get(name))
            .map(|d| d.options.clone())
    }

    pub fn driver_options(&self, driver: &dyn EventDriver) -> Option<JsonValue> {
        self.driver_options_by_name(driver.name())
    }

    /// Replace the options of a configured driver.
    pub fn set_driver_options(&self, name: &str, options: JsonValue) -> Result<(), EventError> {
        if !self.config.drivers.contains_key(name) {
            return Err(EventError::dispatch(format!("driver `{name}` is not configured")));
        }
        let mut state = self.state_mut();
        if let Some(driver) = state.drivers.get_mut(name) {
            driver.options = options.clone();
        }
        state.option_overrides.insert(name.to_string(), options);
        Ok(())
    }

    /// Name of the configured default driver.
    pub fn default_driver_name(&self) -> String {
        (self.config.default_driver)(self).name().to_string()
    }

    pub fn add_interceptor(&self, interceptor: Arc<dyn DispatchInterceptor>) {
        self.interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .chain
            .push(interceptor);
    }

    fn intercepted(&self, event: &dyn Event) -> bool {
        let chain = self
            .interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .chain
            .clone();
        chain.iter().any(|i| i.intercept(event))
    }

    /// Intercept dispatches of `ctor`'s type from now on.
    pub fn mock_event(&self, ctor: &EventCtor) {
        {
            let mut interceptors = self.interceptors.write().unwrap_or_else(PoisonError::into_inner);
            if !interceptors.mocks_installed {
                interceptors.chain.push(self.mocks.clone());
                interceptors.mocks_installed = true;
            }
        }
        self.mocks.mock(ctor);
    }

    /// Record `event` if its type is mocked; `true` means it was intercepted.
    pub fn mock_event_dispatched(&self, event: &dyn Event) -> bool {
        self.mocks.intercept(event)
    }

    pub fn assert_dispatched(
        &self,
        ctor: &EventCtor,
        predicate: Option<&dyn Fn(&JsonValue) -> bool>,
    ) -> Result<bool, EventError> {
        self.mocks.assert_dispatched(ctor, predicate)
    }

    pub fn reset_mock_events(&self) {
        self.mocks.reset();
    }

    pub fn mocks(&self) -> &Arc<MockEvents> {
        &self.mocks
    }

    /// Deliver `event` through its resolved driver.
    pub async fn dispatch(&self, event: &dyn Event) -> Result<(), EventError> {
        self.dispatch_inner(event, None).await
    }

    /// Deliver `event` through `driver`, ignoring the event's own preference.
    pub async fn dispatch_with_driver(&self, event: &dyn Event, driver: &str) -> Result<(), EventError> {
        self.dispatch_inner(event, Some(driver)).await
    }

    fn ensure_dispatchable(&self, event: &dyn Event) -> Result<(), EventError> {
        let state = self.state();
        if !state.config_registered {
            return Err(EventError::dispatch(
                "event service config has not been registered",
            ));
        }
        if !state.events.contains_key(event.name()) {
            return Err(EventError::dispatch(format!(
                "event `{}` is not registered",
                event.name()
            )));
        }
        Ok(())
    }

    fn driver_constructor(&self, name: &str) -> Result<DriverConstructor, EventError> {
        self.state()
            .drivers
            .get(name)
            .map(|d| d.constructor.clone())
            .ok_or_else(|| EventError::dispatch(format!("driver `{name}` is not registered")))
    }

    // Boxed so listener fan-out can recurse.
    fn dispatch_inner<'a>(
        &'a self,
        event: &'a dyn Event,
        override_driver: Option<&'a str>,
    ) -> DispatchFuture<'a> {
        Box::pin(async move {
            self.ensure_dispatchable(event)?;

            if self.intercepted(event) {
                debug!(event = event.name(), "dispatch intercepted");
                return Ok(());
            }

            let driver_name = match override_driver.or(event.driver_name()) {
                Some(name) => name.to_string(),
                None => self.default_driver_name(),
            };
            let constructor = self.driver_constructor(&driver_name)?;
            let driver = constructor(self);

            debug!(event = event.name(), driver = %driver_name, queue = event.queue_name(), "dispatching event");
            driver.dispatch(event).await?;

            if event.is_listener() {
                for ctor in self.subscribers(event.name()) {
                    let mut subscriber = ctor.construct(&JsonValue::Null)?;
                    subscriber.set_payload(event.raw_payload().clone());
                    self.dispatch_inner(subscriber.as_ref(), None).await?;
                }
            }

            Ok(())
        })
    }
}
