use super::drain_control::DrainGate;
use super::operation_queue::OperationQueue;
use crate::application::ports::{LocalStore, PhotoEncoder};
use crate::domain::entities::{AttachmentRecord, CapturedFile, OperationPayload, PhotoReference};
use crate::domain::value_objects::{AttachmentId, Collection, EntityId, PhotoPhase};
use crate::shared::error::AppError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// How a delete request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentDeletion {
    /// Never sent; the record and its pending upload are gone.
    Withdrawn,
    /// A `delete_photo` operation was queued.
    Scheduled,
    /// A remote delete was already queued.
    AlreadyScheduled,
}

/// Owns photo attachments from capture until the remote has them.
pub struct AttachmentService {
    store: Arc<dyn LocalStore>,
    encoder: Arc<dyn PhotoEncoder>,
    queue: Arc<OperationQueue>,
    gate: DrainGate,
    collection: Collection,
}

impl AttachmentService {
    pub fn new(
        store: Arc<dyn LocalStore>,
        encoder: Arc<dyn PhotoEncoder>,
        queue: Arc<OperationQueue>,
        gate: DrainGate,
    ) -> Self {
        Self {
            store,
            encoder,
            queue,
            gate,
            collection: Collection::job_photos(),
        }
    }

    /// Compresses and persists the photo, then queues its upload. Invalid
    /// input is rejected before anything is stored.
    pub async fn capture(
        &self,
        owner_id: EntityId,
        phase: PhotoPhase,
        file: CapturedFile,
    ) -> Result<AttachmentId, AppError> {
        let encoder = Arc::clone(&self.encoder);
        let file_name = file.file_name.clone();
        let photo = tokio::task::spawn_blocking(move || encoder.encode(&file)).await??;

        let record = AttachmentRecord {
            id: AttachmentId::generate(),
            owner_id,
            encoded_payload: Some(photo.encoded),
            mime_type: photo.mime_type,
            phase,
            byte_size: photo.byte_size,
            width: photo.width,
            height: photo.height,
            sha256: photo.sha256,
            captured_at: Utc::now(),
            uploaded: false,
            uploaded_at: None,
            marked_for_deletion: false,
        };
        self.store.put_attachment(&record).await?;

        let reference = PhotoReference {
            attachment_id: record.id.clone(),
            owner_id: record.owner_id.clone(),
            phase,
        };
        if let Err(err) = self
            .queue
            .enqueue(
                self.collection.clone(),
                attachment_target(&record.id)?,
                OperationPayload::UploadPhoto(reference),
            )
            .await
        {
            if let Err(cleanup) = self.store.delete_attachment(&record.id).await {
                warn!(
                    target: "fieldsync::attachments",
                    attachment_id = %record.id,
                    error = %cleanup,
                    "could not remove orphaned attachment"
                );
            }
            return Err(err);
        }

        info!(
            target: "fieldsync::attachments",
            attachment_id = %record.id,
            owner_id = %record.owner_id,
            file_name = %file_name,
            byte_size = record.byte_size,
            width = record.width,
            height = record.height,
            "photo captured"
        );
        Ok(record.id)
    }

    /// Never-uploaded photos are removed locally without any network call.
    /// Uploaded ones, or any photo while a drain pass is running, are marked
    /// and removed remotely through a `delete_photo` operation.
    pub async fn delete(&self, attachment_id: &AttachmentId) -> Result<AttachmentDeletion, AppError> {
        let record = self
            .store
            .get_attachment(attachment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("attachment {attachment_id}")))?;

        if record.marked_for_deletion {
            return Ok(AttachmentDeletion::AlreadyScheduled);
        }

        if !record.uploaded {
            if let Some(hold) = self.gate.try_hold() {
                let withdrawn = self.queue.withdraw_upload(attachment_id, &hold).await?;
                self.store.delete_attachment(attachment_id).await?;
                info!(
                    target: "fieldsync::attachments",
                    attachment_id = %attachment_id,
                    withdrawn,
                    "unsent photo discarded"
                );
                return Ok(AttachmentDeletion::Withdrawn);
            }
        }

        self.store.mark_attachment_for_deletion(attachment_id).await?;
        self.queue
            .enqueue(
                self.collection.clone(),
                attachment_target(attachment_id)?,
                OperationPayload::DeletePhoto(PhotoReference {
                    attachment_id: record.id.clone(),
                    owner_id: record.owner_id.clone(),
                    phase: record.phase,
                }),
            )
            .await?;
        info!(
            target: "fieldsync::attachments",
            attachment_id = %attachment_id,
            uploaded = record.uploaded,
            "photo deletion scheduled"
        );
        Ok(AttachmentDeletion::Scheduled)
    }

    pub async fn get(&self, attachment_id: &AttachmentId) -> Result<Option<AttachmentRecord>, AppError> {
        self.store.get_attachment(attachment_id).await
    }

    pub async fn list_for_owner(&self, owner_id: &EntityId) -> Result<Vec<AttachmentRecord>, AppError> {
        self.store.list_attachments(owner_id).await
    }
}

fn attachment_target(attachment_id: &AttachmentId) -> Result<EntityId, AppError> {
    EntityId::new(attachment_id.to_string()).map_err(AppError::Validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::drain_control::DrainTrigger;
    use crate::application::services::status_publisher::StatusPublisher;
    use crate::domain::entities::{EncodedPhoto, NetworkState};
    use crate::domain::value_objects::OperationType;
    use crate::infrastructure::database::Database;
    use crate::infrastructure::store::SqliteLocalStore;
    use bytes::Bytes;
    use sqlx::sqlite::SqlitePoolOptions;
    use tokio::sync::{mpsc, watch};

    struct StubEncoder;

    impl PhotoEncoder for StubEncoder {
        fn encode(&self, file: &CapturedFile) -> Result<EncodedPhoto, AppError> {
            if !file.content_type.starts_with("image/") {
                return Err(AppError::Validation("not an image".into()));
            }
            Ok(EncodedPhoto {
                encoded: "c3R1Yg==".into(),
                mime_type: "image/jpeg".into(),
                byte_size: 4,
                width: 2,
                height: 2,
                sha256: "stub".into(),
            })
        }
    }

    struct Harness {
        store: Arc<dyn LocalStore>,
        queue: Arc<OperationQueue>,
        gate: DrainGate,
        service: AttachmentService,
        _wakeups: mpsc::Receiver<()>,
    }

    async fn setup() -> Harness {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Database::run_migrations(&pool).await.unwrap();
        let store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::new(pool));
        let status = Arc::new(StatusPublisher::new(Arc::clone(&store), 5));
        let (_network, network_rx) = watch::channel(NetworkState::default());
        let (trigger, wakeups) = DrainTrigger::channel(4);
        let queue = Arc::new(OperationQueue::new(
            Arc::clone(&store),
            status,
            network_rx,
            trigger,
        ));
        let gate = DrainGate::new();
        let service = AttachmentService::new(
            Arc::clone(&store),
            Arc::new(StubEncoder),
            Arc::clone(&queue),
            gate.clone(),
        );
        Harness {
            store,
            queue,
            gate,
            service,
            _wakeups: wakeups,
        }
    }

    fn jpeg() -> CapturedFile {
        CapturedFile::new("before.jpg", "image/jpeg", Bytes::from_static(b"raw"))
    }

    fn job() -> EntityId {
        EntityId::new("job-7".into()).unwrap()
    }

    #[tokio::test]
    async fn test_capture_persists_record_and_queues_upload() {
        let h = setup().await;

        let id = h.service.capture(job(), PhotoPhase::Before, jpeg()).await.unwrap();

        let record = h.service.get(&id).await.unwrap().unwrap();
        assert_eq!(record.encoded_payload.as_deref(), Some("c3R1Yg=="));
        assert!(!record.uploaded);

        let pending = h.queue.pending_operations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation_type, OperationType::UploadPhoto);
        assert_eq!(pending[0].payload.attachment_id(), Some(&id));
        assert_eq!(h.service.list_for_owner(&job()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_file_leaves_no_trace() {
        let h = setup().await;
        let file = CapturedFile::new("notes.txt", "text/plain", Bytes::from_static(b"hi"));

        let err = h.service.capture(job(), PhotoPhase::After, file).await.unwrap_err();

        assert!(err.is_validation());
        assert!(h.service.list_for_owner(&job()).await.unwrap().is_empty());
        assert!(h.queue.pending_operations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleting_unsent_photo_withdraws_upload() {
        let h = setup().await;
        let id = h.service.capture(job(), PhotoPhase::Before, jpeg()).await.unwrap();

        let outcome = h.service.delete(&id).await.unwrap();

        assert_eq!(outcome, AttachmentDeletion::Withdrawn);
        assert!(h.service.get(&id).await.unwrap().is_none());
        assert!(h.queue.pending_operations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleting_during_drain_schedules_remote_delete() {
        let h = setup().await;
        let id = h.service.capture(job(), PhotoPhase::Before, jpeg()).await.unwrap();

        let _draining = h.gate.try_hold().unwrap();
        let outcome = h.service.delete(&id).await.unwrap();

        assert_eq!(outcome, AttachmentDeletion::Scheduled);
        let record = h.service.get(&id).await.unwrap().unwrap();
        assert!(record.marked_for_deletion);
        let types: Vec<OperationType> = h
            .queue
            .pending_operations()
            .await
            .unwrap()
            .iter()
            .map(|op| op.operation_type)
            .collect();
        assert_eq!(types, vec![OperationType::UploadPhoto, OperationType::DeletePhoto]);
    }

    #[tokio::test]
    async fn test_deleting_uploaded_photo_schedules_once() {
        let h = setup().await;
        let id = h.service.capture(job(), PhotoPhase::After, jpeg()).await.unwrap();
        h.store.mark_attachment_uploaded(&id, Utc::now()).await.unwrap();

        assert_eq!(h.service.delete(&id).await.unwrap(), AttachmentDeletion::Scheduled);
        assert_eq!(
            h.service.delete(&id).await.unwrap(),
            AttachmentDeletion::AlreadyScheduled
        );

        let deletes = h
            .queue
            .pending_operations()
            .await
            .unwrap()
            .into_iter()
            .filter(|op| op.operation_type == OperationType::DeletePhoto)
            .count();
        assert_eq!(deletes, 1);
    }

    #[tokio::test]
    async fn test_deleting_unknown_photo_is_not_found() {
        let h = setup().await;
        let err = h.service.delete(&AttachmentId::generate()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
