//! Durable delivery: dispatch persists a work item instead of executing.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use courier_events::{DriverConfig, DriverConstructor, Event, EventDriver, EventError, EventService, driver_constructor};

use crate::queue::{NewWorkItem, WorkerModelFactory};

/// Name the queueable driver is registered under by default.
pub const QUEUE_DRIVER: &str = "queue";

/// Options of the queueable driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueDriverOptions {
    /// Attempt ceiling stored on new work items.
    pub retries: u32,
}

impl Default for QueueDriverOptions {
    fn default() -> Self {
        Self { retries: 3 }
    }
}

impl QueueDriverOptions {
    /// Typed view of raw driver options; `null` or missing means defaults.
    pub fn from_value(value: Option<&JsonValue>) -> Result<Self, serde_json::Error> {
        match value {
            None | Some(JsonValue::Null) => Ok(Self::default()),
            Some(v) => serde_json::from_value(v.clone()),
        }
    }

    pub fn to_value(&self) -> JsonValue {
        serde_json::json!({ "retries": self.retries })
    }
}

/// Stores every dispatched event as a work item for the worker to run later.
pub struct QueueableDriver {
    name: String,
    factory: Arc<dyn WorkerModelFactory>,
    options: QueueDriverOptions,
}

impl QueueableDriver {
    pub fn new(factory: Arc<dyn WorkerModelFactory>, options: QueueDriverOptions) -> Self {
        Self::named(QUEUE_DRIVER, factory, options)
    }

    pub fn named(
        name: impl Into<String>,
        factory: Arc<dyn WorkerModelFactory>,
        options: QueueDriverOptions,
    ) -> Self {
        Self {
            name: name.into(),
            factory,
            options,
        }
    }

    pub fn options(&self) -> QueueDriverOptions {
        self.options
    }

    /// Constructor for registration under [`QUEUE_DRIVER`].
    pub fn constructor(factory: Arc<dyn WorkerModelFactory>) -> DriverConstructor {
        Self::constructor_named(QUEUE_DRIVER, factory)
    }

    /// Constructor reading its options from the service under `name`.
    pub fn constructor_named(
        name: impl Into<String>,
        factory: Arc<dyn WorkerModelFactory>,
    ) -> DriverConstructor {
        let name = name.into();
        driver_constructor(move |service: &EventService| {
            let raw = service.driver_options_by_name(&name);
            let options = QueueDriverOptions::from_value(raw.as_ref()).unwrap_or_else(|err| {
                warn!(driver = %name, error = %err, "invalid queue driver options, using defaults");
                QueueDriverOptions::default()
            });
            Box::new(QueueableDriver::named(name.clone(), Arc::clone(&factory), options))
        })
    }

    /// Driver config entry with explicit options.
    pub fn config(factory: Arc<dyn WorkerModelFactory>, options: QueueDriverOptions) -> DriverConfig {
        DriverConfig::new(Self::constructor(factory)).with_options(options.to_value())
    }
}

impl core::fmt::Debug for QueueableDriver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueueableDriver")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventDriver for QueueableDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, event: &dyn Event) -> Result<(), EventError> {
        let mut model = self.factory.create_worker_model(NewWorkItem {
            event_name: event.name().to_string(),
            payload: event.raw_payload().clone(),
            queue_name: event.queue_name().to_string(),
            retries: self.options.retries,
            available_at: None,
        });

        model
            .save()
            .await
            .map_err(|e| EventError::driver(self.name.clone(), e))?;

        debug!(
            event = event.name(),
            queue = event.queue_name(),
            worker_id = %model.id(),
            retries = self.options.retries,
            "event queued"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn options_default_to_three_retries() {
        assert_eq!(QueueDriverOptions::from_value(None).unwrap().retries, 3);
        assert_eq!(
            QueueDriverOptions::from_value(Some(&JsonValue::Null)).unwrap().retries,
            3
        );
        assert_eq!(
            QueueDriverOptions::from_value(Some(&json!({}))).unwrap().retries,
            3
        );
        assert_eq!(
            QueueDriverOptions::from_value(Some(&json!({"retries": 5}))).unwrap().retries,
            5
        );
        assert!(QueueDriverOptions::from_value(Some(&json!({"retries": "many"}))).is_err());
    }
}
