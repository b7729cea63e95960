//! Durable queue infrastructure: work item storage, the queueable driver and the worker.

pub mod config;
pub mod driver;
pub mod queue;
pub mod worker;


pub use config::{ConfigError, WorkerConfig};
pub use driver::{QUEUE_DRIVER, QueueDriverOptions, QueueableDriver};
pub use queue::{
    BackoffPolicy, BackoffStrategy, FailedWorkItem, FailedWorkerModel, InMemoryWorkerRepository,
    NewFailedWorkItem, NewWorkItem, PostgresWorkerRepository, RepositoryError,
    RepositoryModelFactory, WorkItem, WorkItemPatch, WorkerFilter, WorkerModel,
    WorkerModelFactory, WorkerRepository,
};
pub use worker::{
    WorkerError, WorkerLoop, WorkerLoopHandle, WorkerOptions, WorkerOutcome, WorkerRunReport,
    WorkerService,
};
