mod common;

use chrono::{Duration, Utc};
use common::{entity, open_engine, target_of, test_config, FakeRemote};
use fieldsync::{
    Collection, FieldPatch, JobStatusChange, OperationPayload, OperationType, RemoteWrite,
};
use serde_json::json;
use tempfile::TempDir;

fn lead_status(status: &str) -> OperationPayload {
    OperationPayload::UpdateLead(FieldPatch::from_value(json!({ "status": status })).unwrap())
}

#[tokio::test]
async fn test_enqueued_operations_survive_restart_in_order() {
    let dir = TempDir::new().unwrap();
    let remote = FakeRemote::new();

    let before = {
        let t = open_engine(test_config(&dir), remote.clone()).await;
        t.engine
            .enqueue(Collection::leads(), entity("L1"), lead_status("accepted"))
            .await
            .unwrap();
        t.engine
            .enqueue(
                Collection::new("jobs".into()).unwrap(),
                entity("J1"),
                OperationPayload::UpdateJobStatus(JobStatusChange {
                    status: "en_route".into(),
                    note: Some("leaving depot".into()),
                    changed_at: None,
                }),
            )
            .await
            .unwrap();
        t.engine
            .enqueue(Collection::leads(), entity("L1"), lead_status("completed"))
            .await
            .unwrap();
        let pending = t.engine.pending_operations().await.unwrap();
        t.engine.shutdown().await;
        pending
    };

    let t = open_engine(test_config(&dir), remote.clone()).await;
    let after = t.engine.pending_operations().await.unwrap();

    assert_eq!(after.len(), 3);
    for (was, is) in before.iter().zip(after.iter()) {
        assert_eq!(was.id, is.id);
        assert_eq!(was.operation_type, is.operation_type);
        assert_eq!(was.target_id, is.target_id);
        assert_eq!(was.payload, is.payload);
    }
    assert_eq!(t.engine.status().pending_count, 3);
    assert_eq!(remote.call_count(), 0);
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_offline_enqueue_makes_no_remote_calls() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), FakeRemote::new()).await;
    assert!(!t.engine.network_state().is_online);

    for n in 0..10 {
        t.engine
            .enqueue(Collection::leads(), entity(&format!("L{n}")), lead_status("new"))
            .await
            .unwrap();
    }
    t.engine.retry_sync_now();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(t.engine.pending_operations().await.unwrap().len(), 10);
    assert_eq!(t.remote.call_count(), 0);
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_lead_update_is_normalized_and_synced_on_reconnect() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), FakeRemote::new()).await;

    t.engine
        .enqueue(Collection::leads(), entity("L1"), lead_status("Accept"))
        .await
        .unwrap();
    assert_eq!(t.engine.pending_operations().await.unwrap().len(), 1);
    assert_eq!(t.engine.status().pending_count, 1);

    let report = t.go_online().await;

    assert_eq!(report.applied, 1);
    let calls = t.remote.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        RemoteWrite::Update { collection, id, fields } => {
            assert_eq!(collection, &Collection::leads());
            assert_eq!(id.as_str(), "L1");
            assert_eq!(fields["status"], json!("accepted"));
        }
        other => panic!("unexpected write {other:?}"),
    }

    let status = t.engine.refresh_status().await.unwrap();
    assert_eq!(status.pending_count, 0);
    assert!(!status.is_syncing);
    assert!(status.last_sync_at.is_some());
    assert!(t.engine.pending_operations().await.unwrap().is_empty());
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_drain_applies_in_enqueue_order() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), FakeRemote::new()).await;

    let targets = ["L3", "L1", "L2", "L1"];
    for target in targets {
        t.engine
            .enqueue(Collection::leads(), entity(target), lead_status("assigned"))
            .await
            .unwrap();
    }

    t.go_online().await;

    let applied: Vec<String> = t.remote.calls().iter().map(target_of).collect();
    assert_eq!(applied, targets);
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_reconnection_triggers_exactly_one_drain() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), FakeRemote::new()).await;

    t.go_online().await;
    t.go_offline().await;

    t.engine
        .enqueue(Collection::leads(), entity("L1"), lead_status("accepted"))
        .await
        .unwrap();
    assert_eq!(t.remote.call_count(), 0);

    let mut reports = t.engine.subscribe_reports();
    let report = t.go_online().await;
    assert_eq!(report.applied, 1);

    // already online: no new edge, no new pass
    t.engine.check_connectivity_now().await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let _ = reports.try_recv();
    assert!(reports.try_recv().is_err());
    assert_eq!(t.remote.call_count(), 1);
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_five_failures_flag_operation_and_clear_failed_removes_it() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), FakeRemote::new()).await;
    t.remote.fail_for("L1");

    let id = t
        .engine
        .enqueue(Collection::leads(), entity("L1"), lead_status("accepted"))
        .await
        .unwrap();

    let first = t.go_online().await;
    assert_eq!(first.failed, 1);
    for _ in 0..4 {
        let report = t.engine.sync_now().await.unwrap().expect("gate free");
        assert_eq!(report.failed, 1);
    }

    let pending = t.engine.pending_operations().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].retry_count, 5);
    assert!(pending[0].last_error.as_deref().unwrap().contains("503"));

    let failed = t.engine.failed_operations().await.unwrap();
    assert_eq!(failed.len(), 1);
    let status = t.engine.refresh_status().await.unwrap();
    assert_eq!(status.failed_count, 1);
    assert_eq!(status.pending_count_by_type[&OperationType::UpdateLead], 1);

    assert_eq!(t.engine.clear_failed_operations().await.unwrap(), 1);
    assert!(t.engine.pending_operations().await.unwrap().is_empty());
    assert_eq!(t.engine.status().failed_count, 0);
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_failed_operation_keeps_retrying_until_it_succeeds() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), FakeRemote::new()).await;
    t.remote.fail_for("L1");
    t.engine
        .enqueue(Collection::leads(), entity("L1"), lead_status("accepted"))
        .await
        .unwrap();

    t.go_online().await;
    t.remote.recover("L1");
    let report = t.engine.sync_now().await.unwrap().unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(t.remote.call_count(), 2);
    assert!(t.engine.pending_operations().await.unwrap().is_empty());

    // never resent once synced
    t.engine.sync_now().await.unwrap();
    assert_eq!(t.remote.call_count(), 2);
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_remote_change_after_enqueue_is_applied_with_advisory() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), FakeRemote::new()).await;
    let mut advisories = t.engine.subscribe_advisories();

    t.engine
        .enqueue(Collection::leads(), entity("L1"), lead_status("accepted"))
        .await
        .unwrap();
    t.remote.touch("L1", Utc::now() + Duration::minutes(2));

    let report = t.go_online().await;

    assert_eq!(report.applied, 1);
    assert_eq!(report.advisories.len(), 1);
    let advisory = advisories.try_recv().unwrap();
    assert_eq!(advisory.target_id.as_str(), "L1");
    assert_eq!(advisory.operation_type, OperationType::UpdateLead);
    assert_eq!(t.remote.call_count(), 1);
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_delete_operation_removes_single_entry() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), FakeRemote::new()).await;
    let keep = t
        .engine
        .enqueue(Collection::leads(), entity("L1"), lead_status("new"))
        .await
        .unwrap();
    let discard = t
        .engine
        .enqueue(Collection::leads(), entity("L2"), lead_status("new"))
        .await
        .unwrap();

    assert!(t.engine.delete_operation(discard).await.unwrap());

    let pending = t.engine.pending_operations().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, keep);
    t.engine.shutdown().await;
}
