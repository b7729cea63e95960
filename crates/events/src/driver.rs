//! Delivery strategies for events.
//!
//! A driver is built fresh for every dispatch from its [`DriverConstructor`],
//! which receives the owning [`EventService`] so it can capture its options.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::EventError;
use crate::event::Event;
use crate::service::EventService;

/// Name of the in-process driver.
pub const SYNC_DRIVER: &str = "sync";

#[async_trait]
pub trait EventDriver: Send + Sync {
    /// Identity used to look up per-driver options.
    fn name(&self) -> &str;

    async fn dispatch(&self, event: &dyn Event) -> Result<(), EventError>;
}

/// Builds a driver for one dispatch.
pub type DriverConstructor = Arc<dyn Fn(&EventService) -> Box<dyn EventDriver> + Send + Sync>;

pub fn driver_constructor<F>(f: F) -> DriverConstructor
where
    F: Fn(&EventService) -> Box<dyn EventDriver> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Registered driver: how to build it plus its options.
#[derive(Clone)]
pub struct DriverConfig {
    pub constructor: DriverConstructor,
    pub options: JsonValue,
}

impl DriverConfig {
    pub fn new(constructor: DriverConstructor) -> Self {
        Self {
            constructor,
            options: JsonValue::Null,
        }
    }

    pub fn with_options(mut self, options: JsonValue) -> Self {
        self.options = options;
        self
    }
}

impl core::fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DriverConfig")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Executes the event inline; execution errors reach the dispatching caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncDriver;

impl SyncDriver {
    pub fn constructor() -> DriverConstructor {
        driver_constructor(|_| Box::new(SyncDriver))
    }
}

#[async_trait]
impl EventDriver for SyncDriver {
    fn name(&self) -> &str {
        SYNC_DRIVER
    }

    async fn dispatch(&self, event: &dyn Event) -> Result<(), EventError> {
        debug!(event = event.name(), "executing event inline");
        event.execute().await.map_err(EventError::Execution)
    }
}
