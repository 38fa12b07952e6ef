use super::drain_control::{DrainHold, DrainTrigger};
use super::status_publisher::StatusPublisher;
use crate::application::ports::LocalStore;
use crate::domain::entities::{NetworkState, OperationDraft, OperationPayload, PendingOperation};
use crate::domain::value_objects::{AttachmentId, Collection, EntityId, OperationId, OperationType};
use crate::shared::error::AppError;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The only write path into the pending-operation log.
pub struct OperationQueue {
    store: Arc<dyn LocalStore>,
    status: Arc<StatusPublisher>,
    network: watch::Receiver<NetworkState>,
    trigger: DrainTrigger,
}

impl OperationQueue {
    pub fn new(
        store: Arc<dyn LocalStore>,
        status: Arc<StatusPublisher>,
        network: watch::Receiver<NetworkState>,
        trigger: DrainTrigger,
    ) -> Self {
        Self {
            store,
            status,
            network,
            trigger,
        }
    }

    /// Durably appends an operation. Succeeds regardless of connectivity; when
    /// online the dispatcher is woken without waiting for the remote apply.
    pub async fn enqueue(
        &self,
        collection: Collection,
        target_id: EntityId,
        payload: OperationPayload,
    ) -> Result<OperationId, AppError> {
        payload.validate().map_err(AppError::Validation)?;

        let draft = OperationDraft::new(collection, target_id, payload);
        let id = self.store.append_operation(&draft).await?;

        info!(
            target: "fieldsync::queue",
            operation_id = %id,
            operation_type = %draft.operation_type(),
            collection = %draft.collection,
            target_id = %draft.target_id,
            "operation enqueued"
        );

        self.publish_status().await;

        let online = self.network.borrow().is_online;
        if online {
            self.trigger.request();
        } else {
            debug!(target: "fieldsync::queue", operation_id = %id, "offline; operation held");
        }

        Ok(id)
    }

    pub async fn pending_operations(&self) -> Result<Vec<PendingOperation>, AppError> {
        self.store.list_unsynced_operations().await
    }

    pub async fn failed_operations(&self) -> Result<Vec<PendingOperation>, AppError> {
        let max_retries = self.status.max_retries();
        Ok(self
            .store
            .list_unsynced_operations()
            .await?
            .into_iter()
            .filter(|op| op.is_failed(max_retries))
            .collect())
    }

    pub async fn get_operation(&self, id: OperationId) -> Result<Option<PendingOperation>, AppError> {
        self.store.get_operation(id).await
    }

    pub async fn delete_operation(&self, id: OperationId) -> Result<bool, AppError> {
        let removed = self.store.delete_operation(id).await?;
        if removed {
            info!(target: "fieldsync::queue", operation_id = %id, "operation deleted");
            self.publish_status().await;
        }
        Ok(removed)
    }

    /// Drops every operation flagged as failed and returns how many went.
    pub async fn clear_failed_operations(&self) -> Result<u64, AppError> {
        let removed = self
            .store
            .delete_failed_operations(self.status.max_retries())
            .await?;
        info!(target: "fieldsync::queue", removed, "failed operations cleared");
        self.publish_status().await;
        Ok(removed)
    }

    pub fn retry_sync_now(&self) {
        debug!(target: "fieldsync::queue", "manual sync requested");
        self.trigger.request();
    }

    /// Removes the unsent `upload_photo` operations for an attachment. Taking
    /// a [`DrainHold`] keeps this from racing a drain pass.
    pub async fn withdraw_upload(
        &self,
        attachment_id: &AttachmentId,
        _hold: &DrainHold,
    ) -> Result<u64, AppError> {
        let removed = self
            .store
            .delete_unsynced_for_attachment(OperationType::UploadPhoto, attachment_id)
            .await?;
        if removed > 0 {
            info!(
                target: "fieldsync::queue",
                attachment_id = %attachment_id,
                removed,
                "pending upload withdrawn"
            );
            self.publish_status().await;
        }
        Ok(removed)
    }

    async fn publish_status(&self) {
        if let Err(err) = self.status.refresh().await {
            warn!(target: "fieldsync::queue", error = %err, "failed to recompute sync status");
        }
    }
}
