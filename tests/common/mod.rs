#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use fieldsync::{
    AppConfig, CapturedFile, Collection, DrainReport, EntityId, ReachabilityProbe, RemoteApply,
    RemoteEndpoints, RemoteError, RemoteReader, RemoteRecord, RemoteWrite, SyncEngine,
};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// In-process stand-in for the remote system of record.
#[derive(Default)]
pub struct FakeRemote {
    calls: Mutex<Vec<RemoteWrite>>,
    failing: Mutex<HashSet<String>>,
    modified: Mutex<HashMap<String, DateTime<Utc>>>,
    collections: Mutex<HashMap<String, Vec<RemoteRecord>>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<RemoteWrite> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    /// Every apply targeting `id` fails with a 503 until cleared.
    pub fn fail_for(&self, id: &str) {
        self.failing.lock().expect("failing lock").insert(id.to_string());
    }

    pub fn recover(&self, id: &str) {
        self.failing.lock().expect("failing lock").remove(id);
    }

    pub fn touch(&self, id: &str, at: DateTime<Utc>) {
        self.modified
            .lock()
            .expect("modified lock")
            .insert(id.to_string(), at);
    }

    pub fn seed(&self, collection: &Collection, records: Vec<RemoteRecord>) {
        self.collections
            .lock()
            .expect("collections lock")
            .insert(collection.to_string(), records);
    }
}

pub fn target_of(write: &RemoteWrite) -> String {
    match write {
        RemoteWrite::Insert { id, .. }
        | RemoteWrite::Update { id, .. }
        | RemoteWrite::Delete { id, .. } => id.to_string(),
        RemoteWrite::UploadAttachment { upload, .. } => upload.attachment_id.to_string(),
        RemoteWrite::DeleteAttachment { attachment_id, .. } => attachment_id.to_string(),
    }
}

#[async_trait]
impl RemoteApply for FakeRemote {
    async fn apply(&self, write: RemoteWrite) -> Result<(), RemoteError> {
        let target = target_of(&write);
        self.calls.lock().expect("calls lock").push(write);
        if self.failing.lock().expect("failing lock").contains(&target) {
            return Err(RemoteError::Unavailable("503 Service Unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteReader for FakeRemote {
    async fn fetch_collection(
        &self,
        collection: &Collection,
    ) -> Result<Vec<RemoteRecord>, RemoteError> {
        Ok(self
            .collections
            .lock()
            .expect("collections lock")
            .get(collection.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn modified_at(
        &self,
        _collection: &Collection,
        id: &EntityId,
    ) -> Result<Option<DateTime<Utc>>, RemoteError> {
        Ok(self
            .modified
            .lock()
            .expect("modified lock")
            .get(id.as_str())
            .copied())
    }
}

/// Reachability decided by the test.
pub struct ScriptedProbe {
    up: AtomicBool,
}

impl ScriptedProbe {
    pub fn new(up: bool) -> Arc<Self> {
        Arc::new(Self {
            up: AtomicBool::new(up),
        })
    }

    pub fn set(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReachabilityProbe for ScriptedProbe {
    async fn probe(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}

/// File-backed config with periodic probing effectively disabled so tests
/// drive connectivity explicitly.
pub fn test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("fieldsync.db").display()
    );
    config.network.probe_interval_secs = 3_600;
    config.network.debounce_millis = 0;
    config
}

pub struct TestEngine {
    pub engine: SyncEngine,
    pub remote: Arc<FakeRemote>,
    pub probe: Arc<ScriptedProbe>,
}

pub async fn open_engine(config: AppConfig, remote: Arc<FakeRemote>) -> TestEngine {
    let probe = ScriptedProbe::new(false);
    let engine = SyncEngine::open(
        config,
        RemoteEndpoints {
            apply: remote.clone(),
            reader: remote.clone(),
            probe: Some(probe.clone()),
        },
    )
    .await
    .expect("engine opens");
    TestEngine {
        engine,
        remote,
        probe,
    }
}

impl TestEngine {
    /// Verifies connectivity and waits for the drain the reconnection starts.
    pub async fn go_online(&self) -> DrainReport {
        let mut reports = self.engine.subscribe_reports();
        self.probe.set(true);
        let state = self.engine.check_connectivity_now().await;
        assert!(state.is_online, "probe up should verify online");
        next_report(&mut reports).await
    }

    /// Two failed probes cross the default offline threshold.
    pub async fn go_offline(&self) {
        self.probe.set(false);
        self.engine.check_connectivity_now().await;
        let state = self.engine.check_connectivity_now().await;
        assert!(!state.is_online, "failed probes should verify offline");
    }
}

pub async fn next_report(reports: &mut broadcast::Receiver<DrainReport>) -> DrainReport {
    tokio::time::timeout(Duration::from_secs(5), reports.recv())
        .await
        .expect("drain report within 5s")
        .expect("report channel open")
}

pub fn photo(name: &str) -> CapturedFile {
    let image = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 128]));
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buffer), ImageOutputFormat::Png)
        .expect("encode png");
    CapturedFile::new(name, "image/png", Bytes::from(buffer))
}

pub fn entity(id: &str) -> EntityId {
    EntityId::new(id.to_string()).expect("entity id")
}
