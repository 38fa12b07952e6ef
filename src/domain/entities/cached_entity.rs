use super::operation_payload::FieldPatch;
use crate::domain::value_objects::{Collection, EntityId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Denormalized snapshot of a remote lead, customer, equipment item or invoice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedEntity {
    pub collection: Collection,
    pub id: EntityId,
    pub data: Map<String, Value>,
    pub cached_at: DateTime<Utc>,
}

impl CachedEntity {
    pub fn new(collection: Collection, id: EntityId, data: Map<String, Value>) -> Self {
        Self {
            collection,
            id,
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn apply_patch(&mut self, patch: &FieldPatch, at: DateTime<Utc>) {
        for (key, value) in patch.fields() {
            self.data.insert(key.clone(), value.clone());
        }
        self.cached_at = at;
    }
}

/// Raw record as served by the remote system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteRecord {
    pub id: EntityId,
    pub data: Map<String, Value>,
}
