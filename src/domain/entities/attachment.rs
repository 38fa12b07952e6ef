use crate::domain::value_objects::{AttachmentId, EntityId, PhotoPhase};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A captured photo. `encoded_payload` is dropped once the upload succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentRecord {
    pub id: AttachmentId,
    pub owner_id: EntityId,
    pub encoded_payload: Option<String>,
    pub mime_type: String,
    pub phase: PhotoPhase,
    pub byte_size: u64,
    pub width: u32,
    pub height: u32,
    pub sha256: String,
    pub captured_at: DateTime<Utc>,
    pub uploaded: bool,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub marked_for_deletion: bool,
}

/// Raw file handed over by the capture surface.
#[derive(Debug, Clone)]
pub struct CapturedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl CapturedFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// Compressed, transport-encoded photo ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPhoto {
    pub encoded: String,
    pub mime_type: String,
    pub byte_size: u64,
    pub width: u32,
    pub height: u32,
    pub sha256: String,
}
