//! Drains a queue: runs due work items and applies the retry/dead-letter policy.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use courier_core::{Logger, WorkerId};
use courier_events::{EventError, EventService};

use crate::config::WorkerConfig;
use crate::queue::{
    BackoffPolicy, NewFailedWorkItem, RepositoryError, WorkItem, WorkItemPatch, WorkerFilter,
    WorkerModel, WorkerModelFactory, WorkerRepository,
};

#[derive(Debug, Error)]
pub enum WorkerError {
    /// A dependency was never wired in.
    #[error("worker service is missing its {0}")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The event's `execute()` failed.
    #[error(transparent)]
    Execution(anyhow::Error),

    #[error("event execution timed out after {0:?}")]
    Timeout(Duration),
}

impl WorkerError {
    /// Diagnostic stored on a failed work item: message, newline, detail.
    pub fn detail(&self) -> String {
        match self {
            WorkerError::Execution(err) => format!("{err}\n{err:?}"),
            other => format!("{other}\n{other:?}"),
        }
    }
}

/// Parameters of one worker run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOptions {
    pub queue_name: String,
    /// Attempt ceiling; written onto each attempted item.
    pub retries: u32,
    /// Sleep before fetching.
    pub run_after: Option<Duration>,
    pub execute_timeout: Option<Duration>,
    /// When set, retried items are hidden until their backoff elapses.
    pub backoff: Option<BackoffPolicy>,
}

impl WorkerOptions {
    pub fn new(queue_name: impl Into<String>, retries: u32) -> Self {
        Self {
            queue_name: queue_name.into(),
            retries,
            run_after: None,
            execute_timeout: None,
            backoff: None,
        }
    }

    pub fn run_after_seconds(mut self, seconds: u64) -> Self {
        self.run_after = Some(Duration::from_secs(seconds));
        self
    }

    pub fn run_after(mut self, delay: Duration) -> Self {
        self.run_after = Some(delay);
        self
    }

    pub fn execute_timeout(mut self, timeout: Duration) -> Self {
        self.execute_timeout = Some(timeout);
        self
    }

    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = Some(policy);
        self
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for WorkerOptions {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            queue_name: config.queue_name.clone(),
            retries: config.retries,
            run_after: config.run_after(),
            execute_timeout: config.execute_timeout(),
            backoff: None,
        }
    }
}

/// Counters for one `run_worker` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerRunReport {
    pub processed: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    /// Items whose handling itself failed (e.g. the repository rejected an update).
    pub errored: usize,
}

/// What happened to a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Succeeded,
    Retried { attempts: u32 },
    DeadLettered { attempts: u32 },
}

impl WorkerRunReport {
    fn record(&mut self, outcome: WorkerOutcome) {
        match outcome {
            WorkerOutcome::Succeeded => self.succeeded += 1,
            WorkerOutcome::Retried { .. } => self.retried += 1,
            WorkerOutcome::DeadLettered { .. } => self.dead_lettered += 1,
        }
    }
}

/// Runs queued events.
///
/// Dependencies are wired after construction (`set_*` / `with_*`). Items are
/// handled one at a time in repository order; nothing prevents two processes
/// from draining the same queue concurrently.
#[derive(Default)]
pub struct WorkerService {
    repository: Option<Arc<dyn WorkerRepository>>,
    factory: Option<Arc<dyn WorkerModelFactory>>,
    logger: Option<Arc<dyn Logger>>,
    event_service: Option<Arc<EventService>>,
}

impl WorkerService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_worker_repository(&mut self, repository: Arc<dyn WorkerRepository>) {
        self.repository = Some(repository);
    }

    pub fn set_worker_factory(&mut self, factory: Arc<dyn WorkerModelFactory>) {
        self.factory = Some(factory);
    }

    pub fn set_logger(&mut self, logger: Arc<dyn Logger>) {
        self.logger = Some(logger);
    }

    pub fn set_event_service(&mut self, event_service: Arc<EventService>) {
        self.event_service = Some(event_service);
    }

    pub fn with_worker_repository(mut self, repository: Arc<dyn WorkerRepository>) -> Self {
        self.set_worker_repository(repository);
        self
    }

    pub fn with_worker_factory(mut self, factory: Arc<dyn WorkerModelFactory>) -> Self {
        self.set_worker_factory(factory);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.set_logger(logger);
        self
    }

    pub fn with_event_service(mut self, event_service: Arc<EventService>) -> Self {
        self.set_event_service(event_service);
        self
    }

    fn repository(&self) -> Result<&Arc<dyn WorkerRepository>, WorkerError> {
        self.repository
            .as_ref()
            .ok_or(WorkerError::NotConfigured("worker repository"))
    }

    fn factory(&self) -> Result<&Arc<dyn WorkerModelFactory>, WorkerError> {
        self.factory
            .as_ref()
            .ok_or(WorkerError::NotConfigured("worker factory"))
    }

    fn event_service(&self) -> Result<&Arc<EventService>, WorkerError> {
        self.event_service
            .as_ref()
            .ok_or(WorkerError::NotConfigured("event service"))
    }

    /// Process every due item of `options.queue_name` once.
    ///
    /// Per-item failures are logged and counted; they never abort the run.
    /// Only missing dependencies or a failed fetch return an error.
    #[instrument(skip(self, options), fields(queue = %options.queue_name, retries = options.retries), err)]
    pub async fn run_worker(&self, options: &WorkerOptions) -> Result<WorkerRunReport, WorkerError> {
        let repository = self.repository()?;
        let factory = self.factory()?;
        self.event_service()?;

        if let Some(delay) = options.run_after {
            debug!(delay = ?delay, "delaying worker run");
            tokio::time::sleep(delay).await;
        }

        let filter = WorkerFilter::queue(options.queue_name.clone()).due_at(Utc::now());
        let items = repository.get_workers(&filter).await?;

        let mut report = WorkerRunReport::default();
        for item in items {
            report.processed += 1;
            let worker_id = item.id;
            let model = factory.load_worker_model(item);

            match self.handle_worker_model(model, options).await {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    report.errored += 1;
                    warn!(worker_id = %worker_id, error = %err, "failed to handle work item");
                    self.log_error(&err);
                }
            }
        }

        if report.processed > 0 {
            info!(
                processed = report.processed,
                succeeded = report.succeeded,
                retried = report.retried,
                dead_lettered = report.dead_lettered,
                errored = report.errored,
                "worker run finished"
            );
        }
        Ok(report)
    }

    /// Run one item and record the result in the repository.
    ///
    /// Success deletes the item. Failure increments `attempts`; once
    /// `attempts >= options.retries` the item moves to the failed store.
    pub async fn handle_worker_model(
        &self,
        mut model: WorkerModel,
        options: &WorkerOptions,
    ) -> Result<WorkerOutcome, WorkerError> {
        match self.execute(model.data(), options).await {
            Ok(()) => {
                model.delete().await?;
                debug!(worker_id = %model.id(), "work item completed");
                Ok(WorkerOutcome::Succeeded)
            }
            Err(err) => self.record_failure(model, err, options).await,
        }
    }

    async fn execute(&self, item: &WorkItem, options: &WorkerOptions) -> Result<(), WorkerError> {
        let event_service = self.event_service()?;

        if item.event_name.is_empty() {
            return Err(EventError::worker(format!("work item {} has no event name", item.id)).into());
        }
        let ctor = event_service.event_ctor_by_name(&item.event_name).ok_or_else(|| {
            EventError::worker(format!("event `{}` is not registered", item.event_name))
        })?;
        let event = ctor.construct(&item.payload)?;

        match options.execute_timeout {
            Some(limit) => tokio::time::timeout(limit, event.execute())
                .await
                .map_err(|_| WorkerError::Timeout(limit))?
                .map_err(WorkerError::Execution),
            None => event.execute().await.map_err(WorkerError::Execution),
        }
    }

    async fn record_failure(
        &self,
        mut model: WorkerModel,
        err: WorkerError,
        options: &WorkerOptions,
    ) -> Result<WorkerOutcome, WorkerError> {
        self.log_error(&err);

        let attempts = model.data().attempts.saturating_add(1);
        let exhausted = attempts >= options.retries;
        let available_at = match (&options.backoff, exhausted) {
            (Some(policy), false) => chrono::Duration::from_std(policy.delay_for_attempt(attempts))
                .ok()
                .map(|delay| Utc::now() + delay),
            _ => None,
        };

        model.update_data(WorkItemPatch {
            attempts: Some(attempts),
            retries: Some(options.retries),
            available_at: available_at.map(Some),
            ..WorkItemPatch::default()
        });
        model.save().await?;

        if !exhausted {
            warn!(
                worker_id = %model.id(),
                event = %model.data().event_name,
                attempts,
                retries = options.retries,
                error = %err,
                "work item failed, will retry"
            );
            return Ok(WorkerOutcome::Retried { attempts });
        }

        let factory = self.factory()?;
        let mut failed = factory
            .create_failed_worker_model(NewFailedWorkItem::from_work_item(model.data(), err.detail()));
        match failed.save().await {
            // left behind by an earlier run whose delete failed
            Ok(()) | Err(RepositoryError::AlreadyExists(_)) => {}
            Err(save_err) => return Err(save_err.into()),
        }
        model.delete().await?;

        warn!(
            worker_id = %model.id(),
            event = %model.data().event_name,
            attempts,
            retries = options.retries,
            error = %err,
            "work item moved to failed store"
        );
        Ok(WorkerOutcome::DeadLettered { attempts })
    }

    /// Move a failed item back to the live queue with zero attempts.
    #[instrument(skip(self), err)]
    pub async fn retry_failed_worker(&self, id: WorkerId) -> Result<WorkItem, WorkerError> {
        let repository = self.repository()?;
        let failed = repository
            .find_failed_worker(id)
            .await?
            .ok_or(RepositoryError::NotFound(id))?;

        let item = failed.requeue();
        repository.create_worker(&item).await?;
        repository.delete_failed_worker(id).await?;

        if let Some(logger) = &self.logger {
            logger.info(&format!("requeued failed work item {id}"));
        }
        Ok(item)
    }

    /// Discard a failed item.
    #[instrument(skip(self), err)]
    pub async fn delete_failed_worker(&self, id: WorkerId) -> Result<(), WorkerError> {
        self.repository()?.delete_failed_worker(id).await?;
        Ok(())
    }

    fn log_error(&self, err: &WorkerError) {
        if let Some(logger) = &self.logger {
            logger.error(err);
        }
    }
}

impl core::fmt::Debug for WorkerService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerService")
            .field("repository", &self.repository.is_some())
            .field("factory", &self.factory.is_some())
            .field("logger", &self.logger.is_some())
            .field("event_service", &self.event_service.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_builder() {
        let options = WorkerOptions::new("mail", 5)
            .run_after_seconds(2)
            .execute_timeout(Duration::from_secs(10))
            .backoff(BackoffPolicy::default());

        assert_eq!(options.queue_name, "mail");
        assert_eq!(options.retries, 5);
        assert_eq!(options.run_after, Some(Duration::from_secs(2)));
        assert_eq!(options.execute_timeout, Some(Duration::from_secs(10)));
        assert!(options.backoff.is_some());
    }

    #[test]
    fn options_from_config() {
        let config = WorkerConfig {
            queue_name: "reports".into(),
            retries: 7,
            run_after_seconds: Some(1),
            ..WorkerConfig::default()
        };
        let options = WorkerOptions::from(&config);
        assert_eq!(options.queue_name, "reports");
        assert_eq!(options.retries, 7);
        assert_eq!(options.run_after, Some(Duration::from_secs(1)));
        assert!(options.backoff.is_none());
    }

    #[tokio::test]
    async fn unconfigured_service_refuses_to_run() {
        let service = WorkerService::new();
        let err = service.run_worker(&WorkerOptions::default()).await.unwrap_err();
        assert!(matches!(err, WorkerError::NotConfigured("worker repository")));
    }

    #[test]
    fn failure_detail_contains_message() {
        let err = WorkerError::Execution(anyhow::anyhow!("Test error"));
        let detail = err.detail();
        assert!(detail.starts_with("Test error\n"));
    }
}
