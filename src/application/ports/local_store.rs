use crate::domain::entities::{
    AttachmentRecord, CachedEntity, OperationDraft, PendingOperation, QueueCounts,
};
use crate::domain::value_objects::{
    AttachmentId, Collection, EntityId, OperationId, OperationType,
};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type EntityPredicate<'a> = &'a (dyn Fn(&CachedEntity) -> bool + Send + Sync);

/// Durable local storage for cached entities, attachments, the pending
/// operation log and sync metadata. Every write is committed before the call
/// returns; a failed call leaves nothing half-written.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn put_entity(&self, entity: &CachedEntity) -> Result<(), AppError>;
    async fn get_entity(
        &self,
        collection: &Collection,
        id: &EntityId,
    ) -> Result<Option<CachedEntity>, AppError>;
    async fn query_entities(
        &self,
        collection: &Collection,
        predicate: EntityPredicate<'_>,
    ) -> Result<Vec<CachedEntity>, AppError>;
    /// Upserts the batch atomically.
    async fn bulk_put_entities(&self, entities: &[CachedEntity]) -> Result<(), AppError>;
    /// Drops the collection's rows and writes `entities`, plus the optional
    /// `(key, value)` metadata marker, in one transaction.
    async fn replace_collection(
        &self,
        collection: &Collection,
        entities: &[CachedEntity],
        marker: Option<(&str, &str)>,
    ) -> Result<(), AppError>;
    async fn delete_entity(&self, collection: &Collection, id: &EntityId)
        -> Result<bool, AppError>;
    /// Removes every cached entity and refresh marker.
    async fn clear_entities(&self) -> Result<(), AppError>;

    async fn append_operation(&self, draft: &OperationDraft) -> Result<OperationId, AppError>;
    async fn get_operation(&self, id: OperationId) -> Result<Option<PendingOperation>, AppError>;
    /// Unsynced operations, oldest first.
    async fn list_unsynced_operations(&self) -> Result<Vec<PendingOperation>, AppError>;
    async fn mark_operation_synced(
        &self,
        id: OperationId,
        synced_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;
    /// Returns the new retry count, `None` when the operation is gone or
    /// already synced.
    async fn record_operation_failure(
        &self,
        id: OperationId,
        error: &str,
        attempted_at: DateTime<Utc>,
    ) -> Result<Option<u32>, AppError>;
    async fn delete_operation(&self, id: OperationId) -> Result<bool, AppError>;
    async fn delete_failed_operations(&self, max_retries: u32) -> Result<u64, AppError>;
    async fn delete_unsynced_for_attachment(
        &self,
        operation_type: OperationType,
        attachment_id: &AttachmentId,
    ) -> Result<u64, AppError>;
    async fn purge_synced_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
    async fn queue_counts(&self, max_retries: u32) -> Result<QueueCounts, AppError>;

    async fn put_attachment(&self, record: &AttachmentRecord) -> Result<(), AppError>;
    async fn get_attachment(&self, id: &AttachmentId)
        -> Result<Option<AttachmentRecord>, AppError>;
    async fn list_attachments(&self, owner_id: &EntityId)
        -> Result<Vec<AttachmentRecord>, AppError>;
    /// Flags the record uploaded and drops its encoded payload.
    async fn mark_attachment_uploaded(
        &self,
        id: &AttachmentId,
        uploaded_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;
    async fn mark_attachment_for_deletion(&self, id: &AttachmentId) -> Result<bool, AppError>;
    async fn delete_attachment(&self, id: &AttachmentId) -> Result<bool, AppError>;

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), AppError>;

    /// Empties all four tables in one transaction.
    async fn clear_all(&self) -> Result<(), AppError>;
}
