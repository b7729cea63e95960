//! Worker service and its polling loop.

pub mod runner;
pub mod service;

pub use runner::{WorkerLoop, WorkerLoopHandle};
pub use service::{WorkerError, WorkerOptions, WorkerOutcome, WorkerRunReport, WorkerService};
