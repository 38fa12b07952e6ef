mod common;

use common::{entity, next_report, open_engine, photo, test_config, FakeRemote};
use fieldsync::{AttachmentDeletion, OperationPayload, OperationType, PhotoPhase, RemoteWrite};
use tempfile::TempDir;

#[tokio::test]
async fn test_photo_deleted_before_sync_never_reaches_remote() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), FakeRemote::new()).await;

    let id = t
        .engine
        .capture_photo(entity("job-1"), PhotoPhase::Before, photo("before.png"))
        .await
        .unwrap();
    let pending = t.engine.pending_operations().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].operation_type, OperationType::UploadPhoto);

    let outcome = t.engine.delete_photo(&id).await.unwrap();
    assert_eq!(outcome, AttachmentDeletion::Withdrawn);
    assert!(t.engine.pending_operations().await.unwrap().is_empty());
    assert!(t.engine.attachment(&id).await.unwrap().is_none());

    let report = t.go_online().await;
    assert_eq!(report.attempted, 0);
    assert_eq!(t.remote.call_count(), 0);
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_captured_photo_uploads_on_reconnect_and_drops_payload() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), FakeRemote::new()).await;

    let id = t
        .engine
        .capture_photo(entity("job-1"), PhotoPhase::After, photo("after.png"))
        .await
        .unwrap();
    let stored = t.engine.attachment(&id).await.unwrap().unwrap();
    assert_eq!(stored.mime_type, "image/jpeg");
    assert!(stored.encoded_payload.is_some());
    assert!(!stored.uploaded);

    let report = t.go_online().await;
    assert_eq!(report.applied, 1);

    let calls = t.remote.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        RemoteWrite::UploadAttachment { upload, .. } => {
            assert_eq!(upload.attachment_id, id);
            assert_eq!(upload.owner_id.as_str(), "job-1");
            assert_eq!(upload.phase, PhotoPhase::After);
            assert_eq!(upload.sha256, stored.sha256);
            assert_eq!(Some(&upload.encoded_payload), stored.encoded_payload.as_ref());
        }
        other => panic!("unexpected write {other:?}"),
    }

    let uploaded = t.engine.attachment(&id).await.unwrap().unwrap();
    assert!(uploaded.uploaded);
    assert!(uploaded.uploaded_at.is_some());
    assert!(uploaded.encoded_payload.is_none());
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_deleting_uploaded_photo_removes_it_remotely() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), FakeRemote::new()).await;

    let id = t
        .engine
        .capture_photo(entity("job-7"), PhotoPhase::Before, photo("site.png"))
        .await
        .unwrap();
    t.go_online().await;
    assert!(t.engine.attachment(&id).await.unwrap().unwrap().uploaded);

    let mut reports = t.engine.subscribe_reports();
    let outcome = t.engine.delete_photo(&id).await.unwrap();
    assert_eq!(outcome, AttachmentDeletion::Scheduled);
    let report = next_report(&mut reports).await;
    assert_eq!(report.applied, 1);

    let calls = t.remote.calls();
    assert_eq!(calls.len(), 2);
    match &calls[1] {
        RemoteWrite::DeleteAttachment {
            attachment_id,
            owner_id,
            ..
        } => {
            assert_eq!(attachment_id, &id);
            assert_eq!(owner_id.as_str(), "job-7");
        }
        other => panic!("unexpected write {other:?}"),
    }
    assert!(t.engine.attachment(&id).await.unwrap().is_none());
    assert!(t.engine.pending_operations().await.unwrap().is_empty());
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_second_delete_of_marked_photo_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), FakeRemote::new()).await;

    let id = t
        .engine
        .capture_photo(entity("job-2"), PhotoPhase::Before, photo("a.png"))
        .await
        .unwrap();
    t.go_online().await;
    t.go_offline().await;

    assert_eq!(
        t.engine.delete_photo(&id).await.unwrap(),
        AttachmentDeletion::Scheduled
    );
    assert_eq!(
        t.engine.delete_photo(&id).await.unwrap(),
        AttachmentDeletion::AlreadyScheduled
    );

    let pending = t.engine.pending_operations().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(matches!(
        pending[0].payload,
        OperationPayload::DeletePhoto(ref reference) if reference.attachment_id == id
    ));
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_photos_listed_per_owner() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), FakeRemote::new()).await;

    for (owner, name) in [("job-1", "a.png"), ("job-1", "b.png"), ("job-2", "c.png")] {
        t.engine
            .capture_photo(entity(owner), PhotoPhase::Before, photo(name))
            .await
            .unwrap();
    }

    assert_eq!(t.engine.attachments_for(&entity("job-1")).await.unwrap().len(), 2);
    assert_eq!(t.engine.attachments_for(&entity("job-2")).await.unwrap().len(), 1);
    assert!(t.engine.attachments_for(&entity("job-3")).await.unwrap().is_empty());
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_photo_delete_racing_reconnect_leaves_nothing_stranded() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), FakeRemote::new()).await;

    let keep = t
        .engine
        .capture_photo(entity("job-3"), PhotoPhase::Before, photo("keep.png"))
        .await
        .unwrap();
    let discard = t
        .engine
        .capture_photo(entity("job-3"), PhotoPhase::After, photo("discard.png"))
        .await
        .unwrap();

    let (outcome, _) = tokio::join!(t.engine.delete_photo(&discard), t.go_online());
    let outcome = outcome.unwrap();

    for _ in 0..100 {
        if t.engine.pending_operations().await.unwrap().is_empty()
            && t.engine.attachment(&discard).await.unwrap().is_none()
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    assert!(t.engine.pending_operations().await.unwrap().is_empty());
    assert!(t.engine.attachment(&discard).await.unwrap().is_none());
    assert!(t.engine.attachment(&keep).await.unwrap().unwrap().uploaded);
    if outcome == AttachmentDeletion::Withdrawn {
        let touched: Vec<String> = t.remote.calls().iter().map(common::target_of).collect();
        assert!(!touched.contains(&discard.to_string()));
    }
    t.engine.shutdown().await;
}
