use crate::domain::value_objects::{Collection, EntityId, OperationId, OperationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictCheck {
    pub has_conflict: bool,
    pub remote_version: Option<DateTime<Utc>>,
}

impl ConflictCheck {
    pub fn clear(remote_version: Option<DateTime<Utc>>) -> Self {
        Self {
            has_conflict: false,
            remote_version,
        }
    }
}

/// Informational signal: the remote copy changed after the operation was
/// queued and the local write was applied over it anyway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictAdvisory {
    pub operation_id: OperationId,
    pub operation_type: OperationType,
    pub collection: Collection,
    pub target_id: EntityId,
    pub enqueued_at: DateTime<Utc>,
    pub remote_modified_at: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
}
