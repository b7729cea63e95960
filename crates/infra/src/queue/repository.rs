//! Storage contract for work items and failed work items.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use courier_core::WorkerId;

use super::types::{FailedWorkItem, WorkItem};

/// Which items a fetch returns.
///
/// Repositories return matching items ordered by `created_at`, then `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerFilter {
    pub queue_name: Option<String>,
    /// Only items whose `available_at` is unset or not after this instant.
    pub due_at: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl WorkerFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn queue(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: Some(queue_name.into()),
            ..Self::default()
        }
    }

    pub fn due_at(mut self, at: DateTime<Utc>) -> Self {
        self.due_at = Some(at);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, item: &WorkItem) -> bool {
        self.queue_name.as_deref().is_none_or(|q| item.queue_name == q)
            && self.due_at.is_none_or(|now| item.is_due(now))
    }

    pub fn matches_failed(&self, item: &FailedWorkItem) -> bool {
        self.queue_name.as_deref().is_none_or(|q| item.queue_name == q)
    }
}

/// Repository operation error.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("work item not found: {0}")]
    NotFound(WorkerId),
    #[error("work item already exists: {0}")]
    AlreadyExists(WorkerId),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable storage for the live queue and the dead-letter store.
///
/// Any backing store satisfying this contract works; the core imposes none.
/// No claim/lease is part of the contract, so two processes draining the same
/// queue may both pick up an item.
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    /// Pending items matching `filter`, oldest first.
    async fn get_workers(&self, filter: &WorkerFilter) -> Result<Vec<WorkItem>, RepositoryError>;

    async fn get_failed_workers(
        &self,
        filter: &WorkerFilter,
    ) -> Result<Vec<FailedWorkItem>, RepositoryError>;

    async fn find_worker(&self, id: WorkerId) -> Result<Option<WorkItem>, RepositoryError>;

    async fn find_failed_worker(
        &self,
        id: WorkerId,
    ) -> Result<Option<FailedWorkItem>, RepositoryError>;

    async fn create_worker(&self, item: &WorkItem) -> Result<(), RepositoryError>;

    async fn update_worker(&self, item: &WorkItem) -> Result<(), RepositoryError>;

    async fn delete_worker(&self, id: WorkerId) -> Result<(), RepositoryError>;

    async fn create_failed_worker(&self, item: &FailedWorkItem) -> Result<(), RepositoryError>;

    async fn delete_failed_worker(&self, id: WorkerId) -> Result<(), RepositoryError>;
}

#[async_trait]
impl<R> WorkerRepository for Arc<R>
where
    R: WorkerRepository + ?Sized,
{
    async fn get_workers(&self, filter: &WorkerFilter) -> Result<Vec<WorkItem>, RepositoryError> {
        (**self).get_workers(filter).await
    }

    async fn get_failed_workers(
        &self,
        filter: &WorkerFilter,
    ) -> Result<Vec<FailedWorkItem>, RepositoryError> {
        (**self).get_failed_workers(filter).await
    }

    async fn find_worker(&self, id: WorkerId) -> Result<Option<WorkItem>, RepositoryError> {
        (**self).find_worker(id).await
    }

    async fn find_failed_worker(
        &self,
        id: WorkerId,
    ) -> Result<Option<FailedWorkItem>, RepositoryError> {
        (**self).find_failed_worker(id).await
    }

    async fn create_worker(&self, item: &WorkItem) -> Result<(), RepositoryError> {
        (**self).create_worker(item).await
    }

    async fn update_worker(&self, item: &WorkItem) -> Result<(), RepositoryError> {
        (**self).update_worker(item).await
    }

    async fn delete_worker(&self, id: WorkerId) -> Result<(), RepositoryError> {
        (**self).delete_worker(id).await
    }

    async fn create_failed_worker(&self, item: &FailedWorkItem) -> Result<(), RepositoryError> {
        (**self).create_failed_worker(item).await
    }

    async fn delete_failed_worker(&self, id: WorkerId) -> Result<(), RepositoryError> {
        (**self).delete_failed_worker(id).await
    }
}
