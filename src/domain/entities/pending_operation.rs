use super::operation_payload::OperationPayload;
use crate::domain::value_objects::{Collection, EntityId, OperationId, OperationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queued intent to mutate remote state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingOperation {
    pub id: OperationId,
    pub operation_type: OperationType,
    pub collection: Collection,
    pub target_id: EntityId,
    pub payload: OperationPayload,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub synced: bool,
    pub synced_at: Option<DateTime<Utc>>,
}

impl PendingOperation {
    /// Retained but needs manual intervention.
    pub fn is_failed(&self, max_retries: u32) -> bool {
        !self.synced && self.retry_count >= max_retries
    }
}

/// An operation before it has been appended to the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationDraft {
    pub collection: Collection,
    pub target_id: EntityId,
    pub payload: OperationPayload,
    pub enqueued_at: DateTime<Utc>,
}

impl OperationDraft {
    pub fn new(collection: Collection, target_id: EntityId, payload: OperationPayload) -> Self {
        Self {
            collection,
            target_id,
            payload,
            enqueued_at: Utc::now(),
        }
    }

    pub fn operation_type(&self) -> OperationType {
        self.payload.operation_type()
    }
}
