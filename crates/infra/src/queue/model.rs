//! Work item models: a record plus the repository it is persisted in.

use std::sync::Arc;

use courier_core::WorkerId;

use super::repository::{RepositoryError, WorkerRepository};
use super::types::{FailedWorkItem, NewFailedWorkItem, NewWorkItem, WorkItem, WorkItemPatch};

/// A live work item bound to its repository.
///
/// `update_data` only changes the in-memory record; `save` persists it.
pub struct WorkerModel {
    data: WorkItem,
    repository: Arc<dyn WorkerRepository>,
    persisted: bool,
}

impl WorkerModel {
    pub fn new(data: WorkItem, repository: Arc<dyn WorkerRepository>) -> Self {
        Self {
            data,
            repository,
            persisted: false,
        }
    }

    /// Wrap a record that was read from the repository.
    pub fn loaded(data: WorkItem, repository: Arc<dyn WorkerRepository>) -> Self {
        Self {
            data,
            repository,
            persisted: true,
        }
    }

    pub fn data(&self) -> &WorkItem {
        &self.data
    }

    pub fn id(&self) -> WorkerId {
        self.data.id
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn update_data(&mut self, patch: WorkItemPatch) {
        patch.apply(&mut self.data);
    }

    /// Create the item on first save, update it afterwards.
    pub async fn save(&mut self) -> Result<(), RepositoryError> {
        if self.persisted {
            self.repository.update_worker(&self.data).await
        } else {
            self.repository.create_worker(&self.data).await?;
            self.persisted = true;
            Ok(())
        }
    }

    /// Remove the item from the live queue.
    pub async fn delete(&mut self) -> Result<(), RepositoryError> {
        self.repository.delete_worker(self.data.id).await?;
        self.persisted = false;
        Ok(())
    }
}

impl core::fmt::Debug for WorkerModel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerModel")
            .field("data", &self.data)
            .field("persisted", &self.persisted)
            .finish_non_exhaustive()
    }
}

/// A dead-lettered item bound to its repository.
pub struct FailedWorkerModel {
    data: FailedWorkItem,
    repository: Arc<dyn WorkerRepository>,
    persisted: bool,
}

impl FailedWorkerModel {
    pub fn new(data: FailedWorkItem, repository: Arc<dyn WorkerRepository>) -> Self {
        Self {
            data,
            repository,
            persisted: false,
        }
    }

    pub fn data(&self) -> &FailedWorkItem {
        &self.data
    }

    pub async fn save(&mut self) -> Result<(), RepositoryError> {
        if !self.persisted {
            self.repository.create_failed_worker(&self.data).await?;
            self.persisted = true;
        }
        Ok(())
    }

    pub async fn delete(&mut self) -> Result<(), RepositoryError> {
        self.repository.delete_failed_worker(self.data.id).await?;
        self.persisted = false;
        Ok(())
    }
}

impl core::fmt::Debug for FailedWorkerModel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FailedWorkerModel")
            .field("data", &self.data)
            .field("persisted", &self.persisted)
            .finish_non_exhaustive()
    }
}

/// Builds worker models for the queue driver and the worker service.
pub trait WorkerModelFactory: Send + Sync {
    fn create_worker_model(&self, attrs: NewWorkItem) -> WorkerModel;

    fn create_failed_worker_model(&self, attrs: NewFailedWorkItem) -> FailedWorkerModel;

    /// Wrap a stored item so it can be updated or deleted.
    fn load_worker_model(&self, item: WorkItem) -> WorkerModel;
}

/// Factory binding every model to one repository.
#[derive(Clone)]
pub struct RepositoryModelFactory {
    repository: Arc<dyn WorkerRepository>,
}

impl RepositoryModelFactory {
    pub fn new(repository: Arc<dyn WorkerRepository>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<dyn WorkerRepository> {
        &self.repository
    }
}

impl WorkerModelFactory for RepositoryModelFactory {
    fn create_worker_model(&self, attrs: NewWorkItem) -> WorkerModel {
        WorkerModel::new(WorkItem::new(attrs), Arc::clone(&self.repository))
    }

    fn create_failed_worker_model(&self, attrs: NewFailedWorkItem) -> FailedWorkerModel {
        FailedWorkerModel::new(FailedWorkItem::new(attrs), Arc::clone(&self.repository))
    }

    fn load_worker_model(&self, item: WorkItem) -> WorkerModel {
        WorkerModel::loaded(item, Arc::clone(&self.repository))
    }
}

impl<F> WorkerModelFactory for Arc<F>
where
    F: WorkerModelFactory + ?Sized,
{
    fn create_worker_model(&self, attrs: NewWorkItem) -> WorkerModel {
        (**self).create_worker_model(attrs)
    }

    fn create_failed_worker_model(&self, attrs: NewFailedWorkItem) -> FailedWorkerModel {
        (**self).create_failed_worker_model(attrs)
    }

    fn load_worker_model(&self, item: WorkItem) -> WorkerModel {
        (**self).load_worker_model(item)
    }
}
