use crate::domain::entities::RemoteRecord;
use crate::domain::value_objects::{AttachmentId, Collection, EntityId, PhotoPhase};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote call timed out")]
    Timeout,

    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("remote entity not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentUpload {
    pub attachment_id: AttachmentId,
    pub owner_id: EntityId,
    pub phase: PhotoPhase,
    pub mime_type: String,
    pub encoded_payload: String,
    pub sha256: String,
    pub captured_at: DateTime<Utc>,
}

/// One remote mutation, already normalized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteWrite {
    Insert {
        collection: Collection,
        id: EntityId,
        fields: Map<String, Value>,
    },
    Update {
        collection: Collection,
        id: EntityId,
        fields: Map<String, Value>,
    },
    Delete {
        collection: Collection,
        id: EntityId,
    },
    UploadAttachment {
        collection: Collection,
        upload: AttachmentUpload,
    },
    DeleteAttachment {
        collection: Collection,
        attachment_id: AttachmentId,
        owner_id: EntityId,
    },
}

impl RemoteWrite {
    pub fn collection(&self) -> &Collection {
        match self {
            RemoteWrite::Insert { collection, .. }
            | RemoteWrite::Update { collection, .. }
            | RemoteWrite::Delete { collection, .. }
            | RemoteWrite::UploadAttachment { collection, .. }
            | RemoteWrite::DeleteAttachment { collection, .. } => collection,
        }
    }
}

/// Write side of the remote system of record.
#[async_trait]
pub trait RemoteApply: Send + Sync {
    async fn apply(&self, write: RemoteWrite) -> Result<(), RemoteError>;
}

/// Read side of the remote system of record.
#[async_trait]
pub trait RemoteReader: Send + Sync {
    async fn fetch_collection(
        &self,
        collection: &Collection,
    ) -> Result<Vec<RemoteRecord>, RemoteError>;

    /// Remote modification marker, `None` when the remote does not track one.
    async fn modified_at(
        &self,
        collection: &Collection,
        id: &EntityId,
    ) -> Result<Option<DateTime<Utc>>, RemoteError>;
}
