use crate::application::ports::LocalStore;
use crate::domain::entities::SyncStatus;
use crate::shared::error::AppError;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

pub const LAST_SYNC_AT_KEY: &str = "last_sync_at";

/// Recomputes [`SyncStatus`] from the operation log and publishes it on a
/// watch channel. The status itself is never stored.
pub struct StatusPublisher {
    store: Arc<dyn LocalStore>,
    max_retries: u32,
    syncing: AtomicBool,
    /// Serializes compute-and-publish so an older snapshot never lands last.
    publishing: Mutex<()>,
    sender: watch::Sender<SyncStatus>,
}

impl StatusPublisher {
    pub fn new(store: Arc<dyn LocalStore>, max_retries: u32) -> Self {
        let (sender, _) = watch::channel(SyncStatus::default());
        Self {
            store,
            max_retries,
            syncing: AtomicBool::new(false),
            publishing: Mutex::new(()),
            sender,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.sender.subscribe()
    }

    /// Last published snapshot; may lag a concurrent queue mutation.
    pub fn current(&self) -> SyncStatus {
        self.sender.borrow().clone()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub async fn set_syncing(&self, syncing: bool) -> Result<SyncStatus, AppError> {
        self.syncing.store(syncing, Ordering::SeqCst);
        self.refresh().await
    }

    pub async fn refresh(&self) -> Result<SyncStatus, AppError> {
        let _publishing = self.publishing.lock().await;
        let counts = self.store.queue_counts(self.max_retries).await?;
        let last_sync_at = self.last_sync_at().await?;

        let status = SyncStatus {
            is_syncing: self.syncing.load(Ordering::SeqCst),
            pending_count: counts.pending_total(),
            failed_count: counts.failed,
            pending_count_by_type: counts.pending_by_type,
            last_sync_at,
            last_error: counts.latest_error,
        };
        self.sender.send_replace(status.clone());
        Ok(status)
    }

    pub async fn record_sync_completed(&self, at: DateTime<Utc>) -> Result<(), AppError> {
        self.store
            .set_metadata(LAST_SYNC_AT_KEY, &at.timestamp_millis().to_string())
            .await
    }

    async fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        let Some(raw) = self.store.get_metadata(LAST_SYNC_AT_KEY).await? else {
            return Ok(None);
        };
        let millis = raw
            .parse::<i64>()
            .map_err(|_| AppError::Storage(format!("corrupt {LAST_SYNC_AT_KEY}: {raw}")))?;
        Ok(Utc.timestamp_millis_opt(millis).single())
    }
}
