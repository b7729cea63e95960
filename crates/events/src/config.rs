//! Event service configuration, supplied at boot.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::driver::{DriverConfig, DriverConstructor, SYNC_DRIVER, SyncDriver};
use crate::event::EventType;
use crate::registry::EventCtor;

/// Subscribers dispatched after a listener event.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub listener: EventCtor,
    pub subscribers: Vec<EventCtor>,
}

/// Drivers, default driver and listener wiring.
#[derive(Clone)]
pub struct EventConfig {
    pub default_driver: DriverConstructor,
    pub drivers: HashMap<String, DriverConfig>,
    /// Keyed by listener event name.
    pub listeners: HashMap<String, ListenerConfig>,
}

impl EventConfig {
    pub fn builder() -> EventConfigBuilder {
        EventConfigBuilder::default()
    }
}

impl Default for EventConfig {
    /// Inline execution only.
    fn default() -> Self {
        Self::builder()
            .driver(SYNC_DRIVER, SyncDriver::constructor())
            .build()
    }
}

impl core::fmt::Debug for EventConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventConfig")
            .field("drivers", &self.drivers)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

pub struct EventConfigBuilder {
    default_driver: DriverConstructor,
    drivers: HashMap<String, DriverConfig>,
    listeners: HashMap<String, ListenerConfig>,
}

impl Default for EventConfigBuilder {
    fn default() -> Self {
        Self {
            default_driver: SyncDriver::constructor(),
            drivers: HashMap::new(),
            listeners: HashMap::new(),
        }
    }
}

impl EventConfigBuilder {
    /// Driver used when neither the caller nor the event names one.
    pub fn default_driver(mut self, constructor: DriverConstructor) -> Self {
        self.default_driver = constructor;
        self
    }

    pub fn driver(self, name: impl Into<String>, constructor: DriverConstructor) -> Self {
        self.driver_with_options(name, constructor, JsonValue::Null)
    }

    pub fn driver_with_options(
        mut self,
        name: impl Into<String>,
        constructor: DriverConstructor,
        options: JsonValue,
    ) -> Self {
        self.drivers
            .insert(name.into(), DriverConfig::new(constructor).with_options(options));
        self
    }

    /// Wire `subscribers` to be dispatched after every `L` dispatch.
    pub fn listener<L: EventType>(mut self, subscribers: Vec<EventCtor>) -> Self {
        let listener = L::ctor();
        self.listeners
            .entry(listener.name().to_string())
            .and_modify(|cfg| cfg.subscribers.extend(subscribers.iter().cloned()))
            .or_insert(ListenerConfig {
                listener,
                subscribers,
            });
        self
    }

    pub fn build(self) -> EventConfig {
        EventConfig {
            default_driver: self.default_driver,
            drivers: self.drivers,
            listeners: self.listeners,
        }
    }
}
