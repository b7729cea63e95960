//! Error taxonomy for event construction and dispatch.

use thiserror::Error;

/// Boxed error produced by a driver while delivering an event.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by events, the registry and the event service.
///
/// Configuration and registration failures surface synchronously to the
/// dispatching caller and are never retried here; retries only exist for
/// queued work and belong to the worker.
#[derive(Debug, Error)]
pub enum EventError {
    /// The payload cannot be represented as JSON.
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),

    /// Service not configured, event not registered or driver not found.
    #[error("event dispatch failed: {0}")]
    Dispatch(String),

    /// Raised by `assert_dispatched` when no matching mock dispatch was captured.
    #[error("event was not dispatched: {0}")]
    NotDispatched(String),

    /// A persisted work item references no usable event.
    #[error("event worker failure: {0}")]
    Worker(String),

    /// `execute()` failed while being run inline.
    #[error(transparent)]
    Execution(anyhow::Error),

    /// A driver could not deliver the event (e.g. the queue store rejected it).
    #[error("driver `{driver}` failed to deliver event: {source}")]
    Driver {
        driver: String,
        #[source]
        source: BoxError,
    },
}

impl EventError {
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    pub fn not_dispatched(msg: impl Into<String>) -> Self {
        Self::NotDispatched(msg.into())
    }

    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }

    pub fn driver(driver: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Driver {
            driver: driver.into(),
            source: source.into(),
        }
    }
}
