//! Work item records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use courier_core::WorkerId;

/// A pending event execution persisted in the live queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkerId,
    /// Registered event name used to rebuild the event.
    pub event_name: String,
    pub payload: JsonValue,
    pub queue_name: String,
    /// Failed attempts so far (starts at 0, never decreases).
    pub attempts: u32,
    /// Attempt ceiling; reaching it dead-letters the item.
    pub retries: u32,
    /// Not fetched before this instant (retry backoff).
    pub available_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Attributes for a work item that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWorkItem {
    pub event_name: String,
    pub payload: JsonValue,
    pub queue_name: String,
    pub retries: u32,
    pub available_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    pub fn new(attrs: NewWorkItem) -> Self {
        let now = Utc::now();
        Self {
            id: WorkerId::new(),
            event_name: attrs.event_name,
            payload: attrs.payload,
            queue_name: attrs.queue_name,
            attempts: 0,
            retries: attrs.retries,
            available_at: attrs.available_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the item may be fetched at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.available_at.is_none_or(|at| at <= now)
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.retries
    }
}

/// Changes merged into a work item in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkItemPatch {
    pub attempts: Option<u32>,
    pub retries: Option<u32>,
    pub queue_name: Option<String>,
    pub payload: Option<JsonValue>,
    pub available_at: Option<Option<DateTime<Utc>>>,
}

impl WorkItemPatch {
    pub fn apply(self, item: &mut WorkItem) {
        if let Some(attempts) = self.attempts {
            // attempts never go backwards
            item.attempts = item.attempts.max(attempts);
        }
        if let Some(retries) = self.retries {
            item.retries = retries;
        }
        if let Some(queue_name) = self.queue_name {
            item.queue_name = queue_name;
        }
        if let Some(payload) = self.payload {
            item.payload = payload;
        }
        if let Some(available_at) = self.available_at {
            item.available_at = available_at;
        }
        item.updated_at = Utc::now();
    }
}

/// Terminal record of a work item that exhausted its attempts.
///
/// Never re-enters the live queue on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedWorkItem {
    /// Id of the live item it was moved from.
    pub id: WorkerId,
    pub event_name: String,
    pub payload: JsonValue,
    pub queue_name: String,
    pub attempts: u32,
    pub retries: u32,
    /// Message followed by diagnostic detail; display only.
    pub error: String,
    pub failed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Attributes for a failed work item that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFailedWorkItem {
    pub id: WorkerId,
    pub event_name: String,
    pub payload: JsonValue,
    pub queue_name: String,
    pub attempts: u32,
    pub retries: u32,
    pub error: String,
    pub created_at: DateTime<Utc>,
}

impl NewFailedWorkItem {
    pub fn from_work_item(item: &WorkItem, error: impl Into<String>) -> Self {
        Self {
            id: item.id,
            event_name: item.event_name.clone(),
            payload: item.payload.clone(),
            queue_name: item.queue_name.clone(),
            attempts: item.attempts,
            retries: item.retries,
            error: error.into(),
            created_at: item.created_at,
        }
    }
}

impl FailedWorkItem {
    pub fn new(attrs: NewFailedWorkItem) -> Self {
        let now = Utc::now();
        Self {
            id: attrs.id,
            event_name: attrs.event_name,
            payload: attrs.payload,
            queue_name: attrs.queue_name,
            attempts: attrs.attempts,
            retries: attrs.retries,
            error: attrs.error,
            failed_at: now,
            created_at: attrs.created_at,
            updated_at: now,
        }
    }

    /// Fresh live item for a manual requeue: same id and payload, zero attempts.
    pub fn requeue(&self) -> WorkItem {
        let now = Utc::now();
        WorkItem {
            id: self.id,
            event_name: self.event_name.clone(),
            payload: self.payload.clone(),
            queue_name: self.queue_name.clone(),
            attempts: 0,
            retries: self.retries,
            available_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_item() -> WorkItem {
        WorkItem::new(NewWorkItem {
            event_name: "TestEvent".into(),
            payload: json!({"foo": "bar"}),
            queue_name: "testing".into(),
            retries: 3,
            available_at: None,
        })
    }

    #[test]
    fn new_items_start_without_attempts() {
        let item = new_item();
        assert_eq!(item.attempts, 0);
        assert_eq!(item.retries, 3);
        assert!(item.is_due(Utc::now()));
        assert!(!item.is_exhausted());
    }

    #[test]
    fn patch_never_lowers_attempts() {
        let mut item = new_item();
        WorkItemPatch {
            attempts: Some(2),
            ..Default::default()
        }
        .apply(&mut item);
        assert_eq!(item.attempts, 2);

        WorkItemPatch {
            attempts: Some(1),
            ..Default::default()
        }
        .apply(&mut item);
        assert_eq!(item.attempts, 2);
    }

    #[test]
    fn future_items_are_not_due() {
        let mut item = new_item();
        item.available_at = Some(Utc::now() + chrono::Duration::minutes(5));
        assert!(!item.is_due(Utc::now()));
    }

    #[test]
    fn failed_item_keeps_identity_and_requeues_fresh() {
        let mut item = new_item();
        item.attempts = 3;

        let failed = FailedWorkItem::new(NewFailedWorkItem::from_work_item(&item, "Test error"));
        assert_eq!(failed.id, item.id);
        assert_eq!(failed.attempts, 3);
        assert_eq!(failed.payload, json!({"foo": "bar"}));

        let requeued = failed.requeue();
        assert_eq!(requeued.id, item.id);
        assert_eq!(requeued.attempts, 0);
        assert_eq!(requeued.queue_name, "testing");
    }
}
