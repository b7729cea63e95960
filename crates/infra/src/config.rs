//! Worker configuration read from the environment.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::{InMemoryWorkerRepository, PostgresWorkerRepository, RepositoryError, WorkerRepository};

pub const ENV_QUEUE: &str = "COURIER_QUEUE";
pub const ENV_RETRIES: &str = "COURIER_RETRIES";
pub const ENV_RUN_AFTER_SECONDS: &str = "COURIER_RUN_AFTER_SECONDS";
pub const ENV_POLL_INTERVAL_MS: &str = "COURIER_POLL_INTERVAL_MS";
pub const ENV_EXECUTE_TIMEOUT_SECS: &str = "COURIER_EXECUTE_TIMEOUT_SECS";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_USE_PERSISTENT_STORES: &str = "USE_PERSISTENT_STORES";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Defaults for worker runs and the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub queue_name: String,
    pub retries: u32,
    pub run_after_seconds: Option<u64>,
    pub poll_interval_ms: u64,
    pub execute_timeout_secs: Option<u64>,
    pub database_url: Option<String>,
    pub use_persistent_stores: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_name: courier_events::DEFAULT_QUEUE.to_string(),
            retries: 3,
            run_after_seconds: None,
            poll_interval_ms: 1000,
            execute_timeout_secs: None,
            database_url: None,
            use_persistent_stores: false,
        }
    }
}

impl WorkerConfig {
    /// Read the process environment; unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            queue_name: get(ENV_QUEUE).unwrap_or(defaults.queue_name),
            retries: parse(ENV_RETRIES, get(ENV_RETRIES))?.unwrap_or(defaults.retries),
            run_after_seconds: parse(ENV_RUN_AFTER_SECONDS, get(ENV_RUN_AFTER_SECONDS))?,
            poll_interval_ms: parse(ENV_POLL_INTERVAL_MS, get(ENV_POLL_INTERVAL_MS))?
                .unwrap_or(defaults.poll_interval_ms),
            execute_timeout_secs: parse(ENV_EXECUTE_TIMEOUT_SECS, get(ENV_EXECUTE_TIMEOUT_SECS))?,
            database_url: get(ENV_DATABASE_URL),
            use_persistent_stores: parse(ENV_USE_PERSISTENT_STORES, get(ENV_USE_PERSISTENT_STORES))?
                .unwrap_or(false),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn run_after(&self) -> Option<Duration> {
        self.run_after_seconds.map(Duration::from_secs)
    }

    pub fn execute_timeout(&self) -> Option<Duration> {
        self.execute_timeout_secs.map(Duration::from_secs)
    }

    /// Postgres when persistent stores are enabled, in-memory otherwise.
    pub async fn build_repository(&self) -> Result<Arc<dyn WorkerRepository>, ConfigError> {
        if !self.use_persistent_stores {
            return Ok(Arc::new(InMemoryWorkerRepository::new()));
        }

        let url = self
            .database_url
            .as_deref()
            .ok_or(ConfigError::Missing(ENV_DATABASE_URL))?;
        let repository = PostgresWorkerRepository::connect(url).await?;
        repository.ensure_schema().await?;
        Ok(Arc::new(repository))
    }
}

fn parse<T>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = WorkerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.queue_name, "default");
        assert_eq!(config.retries, 3);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.run_after().is_none());
    }

    #[test]
    fn reads_all_variables() {
        let config = WorkerConfig::from_lookup(lookup(&[
            (ENV_QUEUE, "mail"),
            (ENV_RETRIES, "5"),
            (ENV_RUN_AFTER_SECONDS, "2"),
            (ENV_POLL_INTERVAL_MS, "250"),
            (ENV_EXECUTE_TIMEOUT_SECS, "30"),
            (ENV_DATABASE_URL, "postgres://localhost/courier"),
            (ENV_USE_PERSISTENT_STORES, "true"),
        ]))
        .unwrap();

        assert_eq!(config.queue_name, "mail");
        assert_eq!(config.retries, 5);
        assert_eq!(config.run_after(), Some(Duration::from_secs(2)));
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.execute_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/courier"));
        assert!(config.use_persistent_stores);
    }

    #[test]
    fn rejects_invalid_numbers() {
        let err = WorkerConfig::from_lookup(lookup(&[(ENV_RETRIES, "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_RETRIES, .. }));
    }

    #[tokio::test]
    async fn persistent_store_requires_database_url() {
        let config = WorkerConfig {
            use_persistent_stores: true,
            ..WorkerConfig::default()
        };
        assert!(matches!(
            config.build_repository().await,
            Err(ConfigError::Missing(ENV_DATABASE_URL))
        ));
    }
}
