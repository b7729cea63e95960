//! Registry of known event types.
//!
//! The registry is an explicit object owned by the composition root. Event
//! types may register themselves on first construction until the event
//! service marks the registry initialized; after that, registration has to be
//! explicit.

use std::any::TypeId;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value as JsonValue;

use crate::error::EventError;
use crate::event::{Event, EventKind, EventType};

/// Constructor for a registered event type.
///
/// Carries the type identity, the event name used as registry key and a
/// function rebuilding the event from a stored payload.
#[derive(Clone)]
pub struct EventCtor {
    type_id: TypeId,
    name: String,
    kind: EventKind,
    construct: fn(&JsonValue) -> Result<Box<dyn Event>, EventError>,
}

fn construct_boxed<E: EventType>(payload: &JsonValue) -> Result<Box<dyn Event>, EventError> {
    Ok(Box::new(E::build(payload)?))
}

impl EventCtor {
    pub fn of<E: EventType>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            name: E::event_name(),
            kind: E::KIND,
            construct: construct_boxed::<E>,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is<E: EventType>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    /// Build a fresh instance carrying `payload`.
    pub fn construct(&self, payload: &JsonValue) -> Result<Box<dyn Event>, EventError> {
        (self.construct)(payload)
    }
}

impl core::fmt::Debug for EventCtor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventCtor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl PartialEq for EventCtor {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for EventCtor {}

#[derive(Debug, Default)]
struct RegistryState {
    events: Vec<EventCtor>,
    initialized: bool,
}

/// Set of event types known to the process.
#[derive(Debug, Default)]
pub struct EventRegistry {
    state: RwLock<RegistryState>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Registry state stays consistent under a panicking writer: every write
    // is a single push, clear or flag flip.
    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an event type. Registering the same type twice is a no-op.
    pub fn register(&self, ctor: EventCtor) {
        let mut state = self.write();
        if !state.events.iter().any(|c| c == &ctor) {
            state.events.push(ctor);
        }
    }

    pub fn register_type<E: EventType>(&self) {
        self.register(E::ctor());
    }

    /// Register on construction; only effective before initialization.
    ///
    /// Returns `true` when the type was added.
    pub fn auto_register(&self, ctor: EventCtor) -> bool {
        let mut state = self.write();
        if state.initialized || state.events.iter().any(|c| c == &ctor) {
            return false;
        }
        state.events.push(ctor);
        true
    }

    /// All registered event types, in registration order.
    pub fn events(&self) -> Vec<EventCtor> {
        self.read().events.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().events.iter().any(|c| c.name() == name)
    }

    pub fn is_initialized(&self) -> bool {
        self.read().initialized
    }

    /// One-way latch set by the event service once its config is registered.
    pub fn set_initialized(&self) {
        self.write().initialized = true;
    }

    /// Forget every registration and reopen the registry (tests only).
    pub fn clear(&self) {
        let mut state = self.write();
        state.events.clear();
        state.initialized = false;
    }
}
