//! Durable queue: work item records, storage and models.

pub mod in_memory;
pub mod model;
pub mod postgres;
pub mod repository;
pub mod retry;
pub mod types;

pub use in_memory::InMemoryWorkerRepository;
pub use model::{FailedWorkerModel, RepositoryModelFactory, WorkerModel, WorkerModelFactory};
pub use postgres::PostgresWorkerRepository;
pub use repository::{RepositoryError, WorkerFilter, WorkerRepository};
pub use retry::{BackoffPolicy, BackoffStrategy};
pub use types::{FailedWorkItem, NewFailedWorkItem, NewWorkItem, WorkItem, WorkItemPatch};
