//! Strongly-typed identifiers.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Identifier of a queued work item.
///
/// A failed work item keeps the id of the live item it was dead-lettered from,
/// so the same type identifies both records.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(Uuid);

impl WorkerId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 so ids sort in creation order.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for WorkerId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<WorkerId> for Uuid {
    fn from(value: WorkerId) -> Self {
        value.0
    }
}

impl FromStr for WorkerId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s).map_err(|e| CoreError::invalid_id(format!("WorkerId: {e}")))?;
        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_time_ordered() {
        let first = WorkerId::new();
        let second = WorkerId::new();
        assert!(first < second);
    }

    #[test]
    fn parse_round_trips_display() {
        let id = WorkerId::new();
        let parsed: WorkerId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "not-a-uuid".parse::<WorkerId>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidId(msg) if msg.starts_with("WorkerId")));
    }

    #[test]
    fn uuid_conversions_preserve_value() {
        let uuid = Uuid::now_v7();
        let id = WorkerId::from(uuid);
        assert_eq!(id.as_uuid(), &uuid);
        assert_eq!(Uuid::from(id), uuid);
        assert_eq!(WorkerId::from_uuid(uuid), id);
        assert_ne!(WorkerId::default(), id);
    }
}
