//! Shared building blocks for the event dispatch and worker crates.
//!
//! Contains no IO: identifiers, the id error type and the logger contract
//! consumed by the worker service.

pub mod error;
pub mod id;
pub mod logger;

pub use error::{CoreError, CoreResult};
pub use id::WorkerId;
pub use logger::{Logger, TracingLogger};
