//! Events: named, payload-carrying units of work.
//!
//! An event is validated when it is built: its payload must survive a JSON
//! round-trip. Concrete events embed an [`EventBase`] and override
//! [`Event::execute`] with the real action.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::casts::Casts;
use crate::error::EventError;
use crate::registry::{EventCtor, EventRegistry};

/// Queue used when an event does not name one.
pub const DEFAULT_QUEUE: &str = "default";

/// Whether an event fans out to subscribers after a successful dispatch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum EventKind {
    #[default]
    Standard,
    /// Dispatching this event also dispatches every subscriber registered
    /// against its name, carrying the same payload.
    Listener,
}

/// State shared by every event: identity, payload and routing.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBase {
    name: String,
    payload: JsonValue,
    queue_name: String,
    driver_name: Option<String>,
    kind: EventKind,
    casts: Casts,
}

impl EventBase {
    pub fn new(name: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            name: name.into(),
            payload,
            queue_name: DEFAULT_QUEUE.to_string(),
            driver_name: None,
            kind: EventKind::Standard,
            casts: Casts::default(),
        }
    }

    pub fn with_queue(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = queue_name.into();
        self
    }

    pub fn with_driver(mut self, driver_name: impl Into<String>) -> Self {
        self.driver_name = Some(driver_name.into());
        self
    }

    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_casts(mut self, casts: Casts) -> Self {
        self.casts = casts;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload as stored, without casts.
    pub fn raw_payload(&self) -> &JsonValue {
        &self.payload
    }

    /// Payload with the declared casts applied.
    pub fn payload(&self) -> JsonValue {
        self.casts.apply(&self.payload)
    }

    pub fn set_payload(&mut self, payload: JsonValue) {
        self.payload = payload;
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn set_queue_name(&mut self, queue_name: impl Into<String>) {
        self.queue_name = queue_name.into();
    }

    pub fn driver_name(&self) -> Option<&str> {
        self.driver_name.as_deref()
    }

    pub fn set_driver_name(&mut self, driver_name: Option<String>) {
        self.driver_name = driver_name;
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn casts(&self) -> &Casts {
        &self.casts
    }
}

/// Runtime interface of an event (object safe).
///
/// Implementors only provide access to their [`EventBase`]; everything else
/// has a default. Override `execute` to perform the actual work. It is what
/// the worker invokes when replaying a persisted work item.
#[async_trait]
pub trait Event: Send + Sync + 'static {
    fn base(&self) -> &EventBase;

    fn base_mut(&mut self) -> &mut EventBase;

    /// Registry key and stored `event_name` of work items.
    fn name(&self) -> &str {
        self.base().name()
    }

    /// Payload with casts applied.
    fn payload(&self) -> JsonValue {
        self.base().payload()
    }

    fn raw_payload(&self) -> &JsonValue {
        self.base().raw_payload()
    }

    fn set_payload(&mut self, payload: JsonValue) {
        self.base_mut().set_payload(payload)
    }

    fn queue_name(&self) -> &str {
        self.base().queue_name()
    }

    fn driver_name(&self) -> Option<&str> {
        self.base().driver_name()
    }

    fn kind(&self) -> EventKind {
        self.base().kind()
    }

    fn is_listener(&self) -> bool {
        self.kind() == EventKind::Listener
    }

    fn validate_payload(&self) -> bool {
        validate_payload(self.raw_payload())
    }

    async fn execute(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl dyn Event {
    /// Deserialize the (casted) payload into a typed value.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, EventError> {
        serde_json::from_value(self.payload()).map_err(|e| {
            EventError::invalid_payload(format!("{}: payload does not match type: {e}", self.name()))
        })
    }
}

/// Static description of an event type: its name, defaults and how to build it.
pub trait EventType: Event + Sized {
    /// Type name; combined with `NAMESPACE` into the event name.
    const NAME: &'static str;
    const NAMESPACE: Option<&'static str> = None;
    const QUEUE: &'static str = DEFAULT_QUEUE;
    const DRIVER: Option<&'static str> = None;
    const KIND: EventKind = EventKind::Standard;

    fn from_base(base: EventBase) -> Self;

    fn casts() -> Casts {
        Casts::default()
    }

    fn event_name() -> String {
        qualified_name(Self::NAMESPACE, Self::NAME)
    }

    fn ctor() -> EventCtor {
        EventCtor::of::<Self>()
    }

    /// Build an event, rejecting payloads that are not representable as JSON.
    fn build<P>(payload: &P) -> Result<Self, EventError>
    where
        P: Serialize + ?Sized,
    {
        let payload = to_payload(payload)?;
        let mut base = EventBase::new(Self::event_name(), payload)
            .with_queue(Self::QUEUE)
            .with_kind(Self::KIND)
            .with_casts(Self::casts());
        if let Some(driver) = Self::DRIVER {
            base = base.with_driver(driver);
        }
        Ok(Self::from_base(base))
    }

    /// Build an event and register its type while the registry is still open.
    fn create<P>(registry: &EventRegistry, payload: &P) -> Result<Self, EventError>
    where
        P: Serialize + ?Sized,
    {
        let event = Self::build(payload)?;
        registry.auto_register(Self::ctor());
        Ok(event)
    }
}

/// `namespace/name`, or just `name` without a namespace.
pub fn qualified_name(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name.to_string(),
    }
}

/// Convert a serializable value into a validated JSON payload.
pub fn to_payload<P>(payload: &P) -> Result<JsonValue, EventError>
where
    P: Serialize + ?Sized,
{
    let value = serde_json::to_value(payload)
        .map_err(|e| EventError::invalid_payload(format!("payload is not serializable: {e}")))?;
    if !validate_payload(&value) {
        return Err(EventError::invalid_payload("payload does not survive a JSON round-trip"));
    }
    Ok(value)
}

/// True when `payload` serializes to JSON text and parses back unchanged.
pub fn validate_payload(payload: &JsonValue) -> bool {
    let Ok(text) = serde_json::to_string(payload) else {
        return false;
    };
    serde_json::from_str::<JsonValue>(&text).is_ok_and(|parsed| &parsed == payload)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::casts::Cast;
    use serde::Deserialize;
    use serde_json::json;

    struct Ping {
        base: EventBase,
    }

    impl Event for Ping {
        fn base(&self) -> &EventBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut EventBase {
            &mut self.base
        }
    }

    impl EventType for Ping {
        const NAME: &'static str = "Ping";
        const NAMESPACE: Option<&'static str> = Some("health");
        const QUEUE: &'static str = "pings";

        fn from_base(base: EventBase) -> Self {
            Self { base }
        }

        fn casts() -> Casts {
            Casts::new().field("seq", Cast::Integer)
        }
    }

    #[test]
    fn name_includes_namespace() {
        assert_eq!(Ping::event_name(), "health/Ping");
        assert_eq!(qualified_name(None, "Ping"), "Ping");
    }

    #[test]
    fn build_applies_type_defaults() {
        let ping = Ping::build(&json!({"seq": "3"})).unwrap();
        assert_eq!(ping.name(), "health/Ping");
        assert_eq!(ping.queue_name(), "pings");
        assert_eq!(ping.driver_name(), None);
        assert!(!ping.is_listener());
        assert_eq!(ping.raw_payload(), &json!({"seq": "3"}));
        assert_eq!(ping.payload(), json!({"seq": 3}));
    }

    #[test]
    fn payload_as_reads_casted_payload() {
        #[derive(Deserialize)]
        struct Seq {
            seq: i64,
        }

        let ping = Ping::build(&json!({"seq": "9"})).unwrap();
        let event: &dyn Event = &ping;
        assert_eq!(event.payload_as::<Seq>().unwrap().seq, 9);
    }

    #[test]
    fn non_string_map_keys_are_rejected() {
        let mut bad: HashMap<Vec<u8>, u8> = HashMap::new();
        bad.insert(vec![1, 2], 3);

        let err = Ping::build(&bad).err().unwrap();
        assert!(matches!(err, EventError::InvalidPayload(_)));
    }

    #[test]
    fn set_payload_replaces_payload() {
        let mut ping = Ping::build(&JsonValue::Null).unwrap();
        ping.set_payload(json!({"seq": 1}));
        assert_eq!(ping.raw_payload(), &json!({"seq": 1}));
        assert!(ping.validate_payload());
    }

    #[test]
    fn create_registers_while_registry_is_open() {
        let registry = EventRegistry::new();
        Ping::create(&registry, &json!({})).unwrap();
        assert!(registry.contains("health/Ping"));

        let closed = EventRegistry::new();
        closed.set_initialized();
        Ping::create(&closed, &json!({})).unwrap();
        assert!(!closed.contains("health/Ping"));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn json_leaf() -> impl Strategy<Value = JsonValue> {
            prop_oneof![
                Just(JsonValue::Null),
                any::<bool>().prop_map(JsonValue::from),
                any::<i64>().prop_map(JsonValue::from),
                "[a-zA-Z0-9 ]{0,16}".prop_map(JsonValue::from),
            ]
        }

        fn json_value() -> impl Strategy<Value = JsonValue> {
            json_leaf().prop_recursive(3, 32, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(JsonValue::Array),
                    prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                        .prop_map(|m| JsonValue::Object(m.into_iter().collect())),
                ]
            })
        }

        proptest! {
            /// Property: any JSON-representable payload builds and is stored unchanged.
            #[test]
            fn json_payloads_always_build(payload in json_value()) {
                let ping = Ping::build(&payload).unwrap();
                prop_assert_eq!(ping.raw_payload(), &payload);
                prop_assert!(ping.validate_payload());
            }

            /// Property: maps keyed by sequences never build.
            #[test]
            fn sequence_keyed_maps_never_build(key in prop::collection::vec(any::<u8>(), 1..4), v in any::<u8>()) {
                let mut bad: HashMap<Vec<u8>, u8> = HashMap::new();
                bad.insert(key, v);
                prop_assert!(Ping::build(&bad).is_err());
            }
        }
    }
}
