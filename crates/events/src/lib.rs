//! Event definitions, registry, drivers and the dispatching service.
//!
//! Events are named, JSON-payload units of work. The [`EventService`] checks
//! that an event is registered, resolves a driver for it and hands it over;
//! drivers either execute the event inline ([`SyncDriver`]) or persist it for
//! a worker to run later (see `courier-infra`).

pub mod casts;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod interceptor;
pub mod registry;
pub mod service;

pub use casts::{Cast, Casts};
pub use config::{EventConfig, EventConfigBuilder, ListenerConfig};
pub use driver::{DriverConfig, DriverConstructor, EventDriver, SYNC_DRIVER, SyncDriver, driver_constructor};
pub use error::{BoxError, EventError};
pub use event::{
    DEFAULT_QUEUE, Event, EventBase, EventKind, EventType, qualified_name, to_payload,
    validate_payload,
};
pub use interceptor::{DispatchInterceptor, DispatchedEvent, MockEvents};
pub use registry::{EventCtor, EventRegistry};
pub use service::EventService;
