use super::conflict_detector::ConflictDetector;
use super::drain_control::{DrainGate, DrainHold};
use super::status_publisher::StatusPublisher;
use crate::application::ports::{AttachmentUpload, LocalStore, RemoteApply, RemoteWrite};
use crate::domain::entities::{
    ConflictAdvisory, DrainReport, NetworkState, OperationPayload, PendingOperation,
};
use crate::domain::normalize::normalize_payload;
use crate::domain::value_objects::OperationType;
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_BUFFER: usize = 64;

/// What the dispatcher will send for one operation.
enum Prepared {
    Send(RemoteWrite),
    /// The remote already has it; only local bookkeeping remains.
    AlreadyApplied,
    /// Local state needed for the call is missing or unusable.
    Unsendable(String),
}

enum Outcome {
    Applied(Option<ConflictAdvisory>),
    Failed(String),
}

/// Drains the pending-operation log against the remote, oldest first, one
/// pass at a time.
pub struct SyncDispatcher {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteApply>,
    conflicts: ConflictDetector,
    status: Arc<StatusPublisher>,
    network: watch::Receiver<NetworkState>,
    gate: DrainGate,
    retention: chrono::Duration,
    reports: broadcast::Sender<DrainReport>,
    advisories: broadcast::Sender<ConflictAdvisory>,
}

impl SyncDispatcher {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteApply>,
        conflicts: ConflictDetector,
        status: Arc<StatusPublisher>,
        network: watch::Receiver<NetworkState>,
        gate: DrainGate,
        retention: chrono::Duration,
    ) -> Self {
        let (reports, _) = broadcast::channel(EVENT_BUFFER);
        let (advisories, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            store,
            remote,
            conflicts,
            status,
            network,
            gate,
            retention,
            reports,
            advisories,
        }
    }

    pub fn subscribe_reports(&self) -> broadcast::Receiver<DrainReport> {
        self.reports.subscribe()
    }

    pub fn subscribe_advisories(&self) -> broadcast::Receiver<ConflictAdvisory> {
        self.advisories.subscribe()
    }

    pub fn is_draining(&self) -> bool {
        self.gate.is_held()
    }

    /// Consumes drain requests until shutdown. Requests queued while a pass
    /// runs are folded into the next pass.
    pub async fn run(self: Arc<Self>, mut requests: mpsc::Receiver<()>, shutdown: CancellationToken) {
        info!(target: "fieldsync::dispatcher", "dispatcher worker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                request = requests.recv() => {
                    if request.is_none() {
                        break;
                    }
                    while requests.try_recv().is_ok() {}
                    // A request is never dropped: wait out whoever holds the gate.
                    let hold = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        hold = self.gate.hold() => hold,
                    };
                    if let Err(err) = self.drain_held(hold).await {
                        error!(target: "fieldsync::dispatcher", error = %err, "drain pass aborted");
                    }
                }
            }
        }
        info!(target: "fieldsync::dispatcher", "dispatcher worker stopped");
    }

    /// Runs one pass. Returns `None` without touching the queue when the gate
    /// is already held.
    pub async fn drain(&self) -> Result<Option<DrainReport>, AppError> {
        let Some(hold) = self.gate.try_hold() else {
            debug!(target: "fieldsync::dispatcher", "drain already in progress; skipping");
            return Ok(None);
        };
        self.drain_held(hold).await.map(Some)
    }

    async fn drain_held(&self, hold: DrainHold) -> Result<DrainReport, AppError> {
        let report = {
            let _hold = hold;
            self.publish_syncing(true).await;
            let outcome = self.drain_pass().await;
            self.publish_syncing(false).await;
            outcome?
        };

        info!(
            target: "fieldsync::dispatcher",
            attempted = report.attempted,
            applied = report.applied,
            failed = report.failed,
            interrupted = report.interrupted,
            purged = report.purged,
            conflicts = report.advisories.len(),
            "drain pass finished"
        );
        // No subscribers is fine.
        let _ = self.reports.send(report.clone());
        Ok(report)
    }

    async fn drain_pass(&self) -> Result<DrainReport, AppError> {
        let started_at = Utc::now();
        let operations = self.store.list_unsynced_operations().await?;
        debug!(target: "fieldsync::dispatcher", pending = operations.len(), "drain pass started");

        let mut report = DrainReport {
            started_at,
            finished_at: started_at,
            attempted: 0,
            applied: 0,
            failed: 0,
            interrupted: false,
            purged: 0,
            advisories: Vec::new(),
            last_error: None,
        };

        for operation in &operations {
            if !self.is_online() {
                info!(
                    target: "fieldsync::dispatcher",
                    remaining = operations.len() - report.attempted,
                    "connectivity lost; stopping drain"
                );
                report.interrupted = true;
                break;
            }

            report.attempted += 1;
            match self.dispatch(operation).await? {
                Outcome::Applied(advisory) => {
                    report.applied += 1;
                    report.advisories.extend(advisory);
                }
                Outcome::Failed(reason) => {
                    report.failed += 1;
                    report.last_error = Some(reason);
                }
            }
        }

        let finished_at = Utc::now();
        report.purged = self
            .store
            .purge_synced_before(finished_at - self.retention)
            .await?;
        if !report.interrupted {
            self.status.record_sync_completed(finished_at).await?;
        }
        report.finished_at = finished_at;
        Ok(report)
    }

    async fn dispatch(&self, operation: &PendingOperation) -> Result<Outcome, AppError> {
        let payload = normalize_payload(&operation.payload);

        let write = match self.prepare(operation, payload).await? {
            Prepared::Send(write) => write,
            Prepared::AlreadyApplied => {
                self.complete(operation).await?;
                return Ok(Outcome::Applied(None));
            }
            Prepared::Unsendable(reason) => return self.fail(operation, reason).await,
        };

        let advisory = if checks_for_conflicts(operation.operation_type) {
            let check = self
                .conflicts
                .check(&operation.collection, &operation.target_id, operation.enqueued_at)
                .await;
            match check.remote_version {
                Some(remote_modified_at) if check.has_conflict => Some(ConflictAdvisory {
                    operation_id: operation.id,
                    operation_type: operation.operation_type,
                    collection: operation.collection.clone(),
                    target_id: operation.target_id.clone(),
                    enqueued_at: operation.enqueued_at,
                    remote_modified_at,
                    detected_at: Utc::now(),
                }),
                _ => None,
            }
        } else {
            None
        };

        match self.remote.apply(write).await {
            Ok(()) => {
                self.complete(operation).await?;
                if let Some(advisory) = &advisory {
                    warn!(
                        target: "fieldsync::dispatcher",
                        operation_id = %operation.id,
                        collection = %operation.collection,
                        target_id = %operation.target_id,
                        remote_modified_at = %advisory.remote_modified_at,
                        "remote changed after operation was queued; local write applied"
                    );
                    let _ = self.advisories.send(advisory.clone());
                }
                Ok(Outcome::Applied(advisory))
            }
            Err(err) => self.fail(operation, err.to_string()).await,
        }
    }

    async fn prepare(
        &self,
        operation: &PendingOperation,
        payload: OperationPayload,
    ) -> Result<Prepared, AppError> {
        let collection = operation.collection.clone();
        let id = operation.target_id.clone();

        let write = match payload {
            OperationPayload::CreateInvoice(patch) => RemoteWrite::Insert {
                collection,
                id,
                fields: patch.into_inner(),
            },
            OperationPayload::UpdateLead(patch)
            | OperationPayload::UpdateInvoice(patch)
            | OperationPayload::UpdateEquipment(patch)
            | OperationPayload::UpdateTimerLog(patch) => RemoteWrite::Update {
                collection,
                id,
                fields: patch.into_inner(),
            },
            OperationPayload::UpdateJobStatus(change) => RemoteWrite::Update {
                collection,
                id,
                fields: to_fields(&change)?,
            },
            OperationPayload::UpdateAgentLocation(location) => RemoteWrite::Update {
                collection,
                id,
                fields: to_fields(&location)?,
            },
            OperationPayload::UploadPhoto(reference) => {
                let Some(record) = self.store.get_attachment(&reference.attachment_id).await?
                else {
                    return Ok(Prepared::Unsendable(format!(
                        "attachment {} is missing locally",
                        reference.attachment_id
                    )));
                };
                if record.uploaded {
                    return Ok(Prepared::AlreadyApplied);
                }
                let Some(encoded_payload) = record.encoded_payload else {
                    return Ok(Prepared::Unsendable(format!(
                        "attachment {} has no payload",
                        reference.attachment_id
                    )));
                };
                RemoteWrite::UploadAttachment {
                    collection,
                    upload: AttachmentUpload {
                        attachment_id: record.id,
                        owner_id: record.owner_id,
                        phase: record.phase,
                        mime_type: record.mime_type,
                        encoded_payload,
                        sha256: record.sha256,
                        captured_at: record.captured_at,
                    },
                }
            }
            OperationPayload::DeletePhoto(reference) => RemoteWrite::DeleteAttachment {
                collection,
                attachment_id: reference.attachment_id,
                owner_id: reference.owner_id,
            },
        };
        Ok(Prepared::Send(write))
    }

    async fn complete(&self, operation: &PendingOperation) -> Result<(), AppError> {
        let now = Utc::now();
        if !self.store.mark_operation_synced(operation.id, now).await? {
            debug!(
                target: "fieldsync::dispatcher",
                operation_id = %operation.id,
                "operation vanished before it could be marked synced"
            );
        }

        match &operation.payload {
            OperationPayload::UploadPhoto(reference) => {
                self.store
                    .mark_attachment_uploaded(&reference.attachment_id, now)
                    .await?;
            }
            OperationPayload::DeletePhoto(reference) => {
                self.store.delete_attachment(&reference.attachment_id).await?;
            }
            _ => {}
        }

        info!(
            target: "fieldsync::dispatcher",
            operation_id = %operation.id,
            operation_type = %operation.operation_type,
            target_id = %operation.target_id,
            "operation applied"
        );
        Ok(())
    }

    async fn fail(&self, operation: &PendingOperation, reason: String) -> Result<Outcome, AppError> {
        let retry_count = self
            .store
            .record_operation_failure(operation.id, &reason, Utc::now())
            .await?;

        match retry_count {
            Some(count) if count >= self.status.max_retries() => error!(
                target: "fieldsync::dispatcher",
                operation_id = %operation.id,
                operation_type = %operation.operation_type,
                retry_count = count,
                error = %reason,
                "operation flagged as failed; needs manual intervention"
            ),
            Some(count) => warn!(
                target: "fieldsync::dispatcher",
                operation_id = %operation.id,
                operation_type = %operation.operation_type,
                retry_count = count,
                error = %reason,
                "operation apply failed; will retry"
            ),
            None => debug!(
                target: "fieldsync::dispatcher",
                operation_id = %operation.id,
                "failed operation no longer pending"
            ),
        }
        Ok(Outcome::Failed(reason))
    }

    fn is_online(&self) -> bool {
        self.network.borrow().is_online
    }

    async fn publish_syncing(&self, syncing: bool) {
        if let Err(err) = self.status.set_syncing(syncing).await {
            warn!(target: "fieldsync::dispatcher", error = %err, "failed to publish sync status");
        }
    }
}

/// Inserts and uploads have no prior remote copy to diverge from.
fn checks_for_conflicts(operation_type: OperationType) -> bool {
    !matches!(
        operation_type,
        OperationType::CreateInvoice | OperationType::UploadPhoto
    )
}

fn to_fields<T: serde::Serialize>(value: &T) -> Result<Map<String, Value>, AppError> {
    match serde_json::to_value(value)? {
        Value::Object(mut fields) => {
            fields.retain(|_, value| !value.is_null());
            Ok(fields)
        }
        other => Err(AppError::Serialization(format!(
            "expected an object payload, got {other}"
        ))),
    }
}
