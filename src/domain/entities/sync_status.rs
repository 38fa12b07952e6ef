use crate::domain::value_objects::OperationType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Derived view over the queue. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub pending_count: u64,
    pub failed_count: u64,
    pub pending_count_by_type: BTreeMap<OperationType, u64>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Counts read from the operation log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending_by_type: BTreeMap<OperationType, u64>,
    pub failed: u64,
    pub latest_error: Option<String>,
}

impl QueueCounts {
    pub fn pending_total(&self) -> u64 {
        self.pending_by_type.values().sum()
    }
}
