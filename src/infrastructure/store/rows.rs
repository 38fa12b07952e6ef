use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct CachedEntityRow {
    pub collection: String,
    pub entity_id: String,
    pub data: String,
    pub cached_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct PendingOperationRow {
    pub id: i64,
    pub operation_type: String,
    pub collection: String,
    pub target_id: String,
    pub payload: String,
    pub enqueued_at: i64,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<i64>,
    pub synced: bool,
    pub synced_at: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AttachmentRow {
    pub id: String,
    pub owner_id: String,
    pub encoded_payload: Option<String>,
    pub mime_type: String,
    pub phase: String,
    pub byte_size: i64,
    pub width: i64,
    pub height: i64,
    pub sha256: String,
    pub captured_at: i64,
    pub uploaded: bool,
    pub uploaded_at: Option<i64>,
    pub marked_for_deletion: bool,
}
