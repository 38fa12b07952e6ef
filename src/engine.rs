use crate::application::ports::{
    LocalStore, PhotoEncoder, ReachabilityProbe, RemoteApply, RemoteReader,
};
use crate::application::services::{
    AttachmentDeletion, AttachmentService, ConflictDetector, DrainGate, DrainTrigger,
    NetworkMonitor, OperationQueue, ReadModelCache, StatusPublisher, SyncDispatcher,
};
use crate::domain::entities::{
    AttachmentRecord, CachedEntity, CapturedFile, ConflictAdvisory, DrainReport, FieldPatch,
    NetworkState, OperationPayload, PendingOperation, SyncStatus,
};
use crate::domain::value_objects::{AttachmentId, Collection, EntityId, OperationId, PhotoPhase};
use crate::infrastructure::database::{Database, DbPool};
use crate::infrastructure::media::JpegPhotoEncoder;
use crate::infrastructure::network::HttpReachabilityProbe;
use crate::infrastructure::store::SqliteLocalStore;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const OS_EVENT_BUFFER: usize = 16;

/// Remote collaborators the engine drives.
#[derive(Clone)]
pub struct RemoteEndpoints {
    pub apply: Arc<dyn RemoteApply>,
    pub reader: Arc<dyn RemoteReader>,
    /// Falls back to an HTTP probe when `network.probe_url` is configured.
    pub probe: Option<Arc<dyn ReachabilityProbe>>,
}

/// One offline-first sync session: opened at process start, shut down at
/// exit. Tests open isolated instances against their own database.
pub struct SyncEngine {
    config: AppConfig,
    pool: DbPool,
    queue: Arc<OperationQueue>,
    status: Arc<StatusPublisher>,
    dispatcher: Arc<SyncDispatcher>,
    cache: Arc<ReadModelCache>,
    attachments: AttachmentService,
    monitor: Arc<NetworkMonitor>,
    os_events: mpsc::Sender<bool>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncEngine {
    /// Opens the store, restores status from the durable log and starts the
    /// dispatcher worker and network monitor. Must run inside a tokio runtime.
    pub async fn open(config: AppConfig, remote: RemoteEndpoints) -> Result<Self, AppError> {
        config.validate().map_err(AppError::Configuration)?;

        let pool = Database::initialize(&config.database).await?;
        let store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::new(pool.clone()));

        let probe = match remote.probe {
            Some(probe) => Some(probe),
            None => HttpReachabilityProbe::from_config(&config.network)?
                .map(|probe| Arc::new(probe) as Arc<dyn ReachabilityProbe>),
        };
        let monitor = Arc::new(NetworkMonitor::new(probe, config.network.clone()));

        let status = Arc::new(StatusPublisher::new(
            Arc::clone(&store),
            config.sync.max_retries,
        ));
        status.refresh().await?;

        let gate = DrainGate::new();
        let (trigger, requests) = DrainTrigger::channel(config.sync.channel_capacity);

        let queue = Arc::new(OperationQueue::new(
            Arc::clone(&store),
            Arc::clone(&status),
            monitor.subscribe(),
            trigger.clone(),
        ));
        let dispatcher = Arc::new(SyncDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&remote.apply),
            ConflictDetector::new(Arc::clone(&remote.reader)),
            Arc::clone(&status),
            monitor.subscribe(),
            gate.clone(),
            config.sync.retention(),
        ));
        let cache = Arc::new(ReadModelCache::new(
            Arc::clone(&store),
            Arc::clone(&remote.reader),
            monitor.subscribe(),
            config.cache.freshness(),
        ));
        let encoder: Arc<dyn PhotoEncoder> =
            Arc::new(JpegPhotoEncoder::new(config.attachments.clone()));
        let attachments =
            AttachmentService::new(Arc::clone(&store), encoder, Arc::clone(&queue), gate);

        let shutdown = CancellationToken::new();
        let (os_events, os_receiver) = mpsc::channel(OS_EVENT_BUFFER);
        let tasks = vec![
            tokio::spawn(Arc::clone(&dispatcher).run(requests, shutdown.clone())),
            tokio::spawn(Arc::clone(&monitor).run(os_receiver, shutdown.clone())),
            tokio::spawn(forward_reconnects(
                Arc::clone(&monitor),
                trigger,
                shutdown.clone(),
            )),
        ];

        let pending = status.current().pending_count;
        info!(target: "fieldsync::queue", pending, "sync engine opened");

        Ok(Self {
            config,
            pool,
            queue,
            status,
            dispatcher,
            cache,
            attachments,
            monitor,
            os_events,
            shutdown,
            tasks,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // Queue API

    pub async fn enqueue(
        &self,
        collection: Collection,
        target_id: EntityId,
        payload: OperationPayload,
    ) -> Result<OperationId, AppError> {
        self.queue.enqueue(collection, target_id, payload).await
    }

    pub async fn pending_operations(&self) -> Result<Vec<PendingOperation>, AppError> {
        self.queue.pending_operations().await
    }

    pub async fn failed_operations(&self) -> Result<Vec<PendingOperation>, AppError> {
        self.queue.failed_operations().await
    }

    pub async fn delete_operation(&self, id: OperationId) -> Result<bool, AppError> {
        self.queue.delete_operation(id).await
    }

    pub async fn clear_failed_operations(&self) -> Result<u64, AppError> {
        self.queue.clear_failed_operations().await
    }

    /// Wakes the dispatcher worker without waiting for the pass.
    pub fn retry_sync_now(&self) {
        self.queue.retry_sync_now();
    }

    /// Runs a drain pass on the caller's task. `None` when one is already
    /// running.
    pub async fn sync_now(&self) -> Result<Option<DrainReport>, AppError> {
        self.dispatcher.drain().await
    }

    // Status API

    pub fn status(&self) -> SyncStatus {
        self.status.current()
    }

    pub async fn refresh_status(&self) -> Result<SyncStatus, AppError> {
        self.status.refresh().await
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_reports(&self) -> broadcast::Receiver<DrainReport> {
        self.dispatcher.subscribe_reports()
    }

    pub fn subscribe_advisories(&self) -> broadcast::Receiver<ConflictAdvisory> {
        self.dispatcher.subscribe_advisories()
    }

    // Network

    pub fn network_state(&self) -> NetworkState {
        self.monitor.state()
    }

    pub fn subscribe_network(&self) -> watch::Receiver<NetworkState> {
        self.monitor.subscribe()
    }

    /// Forwards a raw OS connectivity event; it is debounced and verified
    /// before it can change [`NetworkState`].
    pub async fn report_connectivity(&self, online: bool) -> Result<(), AppError> {
        self.os_events
            .send(online)
            .await
            .map_err(|_| AppError::Internal("network monitor has stopped".to_string()))
    }

    /// Runs one verification round now instead of waiting for the interval.
    pub async fn check_connectivity_now(&self) -> NetworkState {
        self.monitor.verify().await
    }

    // Cache API

    pub async fn get_cached_or_remote(
        &self,
        scope: &Collection,
    ) -> Result<Vec<CachedEntity>, AppError> {
        self.cache.get_cached_or_remote(scope).await
    }

    pub async fn refresh(&self, scope: &Collection) -> Result<Vec<CachedEntity>, AppError> {
        self.cache.refresh(scope).await
    }

    pub async fn update_locally(
        &self,
        scope: &Collection,
        id: &EntityId,
        patch: &FieldPatch,
    ) -> Result<CachedEntity, AppError> {
        self.cache.update_locally(scope, id, patch).await
    }

    pub async fn get_cached(
        &self,
        scope: &Collection,
        id: &EntityId,
    ) -> Result<Option<CachedEntity>, AppError> {
        self.cache.get(scope, id).await
    }

    pub async fn last_refreshed(
        &self,
        scope: &Collection,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        self.cache.last_refreshed(scope).await
    }

    pub async fn clear_cache(&self) -> Result<(), AppError> {
        self.cache.clear().await
    }

    // Attachments

    pub async fn capture_photo(
        &self,
        owner_id: EntityId,
        phase: PhotoPhase,
        file: CapturedFile,
    ) -> Result<AttachmentId, AppError> {
        self.attachments.capture(owner_id, phase, file).await
    }

    pub async fn delete_photo(
        &self,
        attachment_id: &AttachmentId,
    ) -> Result<AttachmentDeletion, AppError> {
        self.attachments.delete(attachment_id).await
    }

    pub async fn attachment(
        &self,
        attachment_id: &AttachmentId,
    ) -> Result<Option<AttachmentRecord>, AppError> {
        self.attachments.get(attachment_id).await
    }

    pub async fn attachments_for(
        &self,
        owner_id: &EntityId,
    ) -> Result<Vec<AttachmentRecord>, AppError> {
        self.attachments.list_for_owner(owner_id).await
    }

    /// Stops background tasks, lets an in-flight drain pass finish and closes
    /// the store.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(err) = task.await {
                warn!(target: "fieldsync::queue", error = %err, "background task ended abnormally");
            }
        }
        self.pool.close().await;
        info!(target: "fieldsync::queue", "sync engine shut down");
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn forward_reconnects(
    monitor: Arc<NetworkMonitor>,
    trigger: DrainTrigger,
    shutdown: CancellationToken,
) {
    let mut changes = monitor.subscribe();
    loop {
        if monitor.take_reconnect() {
            info!(target: "fieldsync::network", "reconnected; requesting drain");
            trigger.request();
        }
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
