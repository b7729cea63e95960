//! In-memory worker repository for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use courier_core::WorkerId;

use super::repository::{RepositoryError, WorkerFilter, WorkerRepository};
use super::types::{FailedWorkItem, WorkItem};

/// Live queue and dead-letter store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryWorkerRepository {
    workers: RwLock<HashMap<WorkerId, WorkItem>>,
    failed: RwLock<HashMap<WorkerId, FailedWorkItem>>,
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Storage("lock poisoned".to_string())
}

impl InMemoryWorkerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerRepository for InMemoryWorkerRepository {
    async fn get_workers(&self, filter: &WorkerFilter) -> Result<Vec<WorkItem>, RepositoryError> {
        let workers = self.workers.read().map_err(poisoned)?;
        let mut result: Vec<_> = workers
            .values()
            .filter(|w| filter.matches(w))
            .cloned()
            .collect();

        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn get_failed_workers(
        &self,
        filter: &WorkerFilter,
    ) -> Result<Vec<FailedWorkItem>, RepositoryError> {
        let failed = self.failed.read().map_err(poisoned)?;
        let mut result: Vec<_> = failed
            .values()
            .filter(|f| filter.matches_failed(f))
            .cloned()
            .collect();

        result.sort_by(|a, b| a.failed_at.cmp(&b.failed_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn find_worker(&self, id: WorkerId) -> Result<Option<WorkItem>, RepositoryError> {
        Ok(self.workers.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn find_failed_worker(
        &self,
        id: WorkerId,
    ) -> Result<Option<FailedWorkItem>, RepositoryError> {
        Ok(self.failed.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn create_worker(&self, item: &WorkItem) -> Result<(), RepositoryError> {
        let mut workers = self.workers.write().map_err(poisoned)?;
        if workers.contains_key(&item.id) {
            return Err(RepositoryError::AlreadyExists(item.id));
        }
        workers.insert(item.id, item.clone());
        Ok(())
    }

    async fn update_worker(&self, item: &WorkItem) -> Result<(), RepositoryError> {
        let mut workers = self.workers.write().map_err(poisoned)?;
        match workers.get_mut(&item.id) {
            Some(existing) => {
                *existing = item.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(item.id)),
        }
    }

    async fn delete_worker(&self, id: WorkerId) -> Result<(), RepositoryError> {
        self.workers
            .write()
            .map_err(poisoned)?
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn create_failed_worker(&self, item: &FailedWorkItem) -> Result<(), RepositoryError> {
        let mut failed = self.failed.write().map_err(poisoned)?;
        if failed.contains_key(&item.id) {
            return Err(RepositoryError::AlreadyExists(item.id));
        }
        failed.insert(item.id, item.clone());
        Ok(())
    }

    async fn delete_failed_worker(&self, id: WorkerId) -> Result<(), RepositoryError> {
        self.failed
            .write()
            .map_err(poisoned)?
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound(id))
    }
}
