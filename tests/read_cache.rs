mod common;

use common::{entity, open_engine, test_config, FakeRemote};
use fieldsync::{Collection, FieldPatch, RemoteRecord};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

fn record(id: &str, data: Value) -> RemoteRecord {
    let data: Map<String, Value> = serde_json::from_value(data).unwrap();
    RemoteRecord {
        id: entity(id),
        data,
    }
}

fn seeded_remote() -> std::sync::Arc<FakeRemote> {
    let remote = FakeRemote::new();
    remote.seed(
        &Collection::leads(),
        vec![
            record("L1", json!({ "status": "new", "customer": "Acme" })),
            record("L2", json!({ "status": "assigned", "customer": "Globex" })),
        ],
    );
    remote
}

#[tokio::test]
async fn test_first_online_read_fetches_and_offline_read_serves_mirror() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), seeded_remote()).await;

    // offline and never fetched: nothing to serve
    assert!(t
        .engine
        .get_cached_or_remote(&Collection::leads())
        .await
        .unwrap()
        .is_empty());

    t.go_online().await;
    let fetched = t
        .engine
        .get_cached_or_remote(&Collection::leads())
        .await
        .unwrap();
    assert_eq!(fetched.len(), 2);
    assert!(t
        .engine
        .last_refreshed(&Collection::leads())
        .await
        .unwrap()
        .is_some());

    t.go_offline().await;
    let offline = t
        .engine
        .get_cached_or_remote(&Collection::leads())
        .await
        .unwrap();
    assert_eq!(offline.len(), 2);
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_local_update_is_visible_before_sync() {
    let dir = TempDir::new().unwrap();
    let t = open_engine(test_config(&dir), seeded_remote()).await;
    t.engine.refresh(&Collection::leads()).await.unwrap();

    let patch = FieldPatch::from_value(json!({ "status": "accepted" })).unwrap();
    let updated = t
        .engine
        .update_locally(&Collection::leads(), &entity("L1"), &patch)
        .await
        .unwrap();
    assert_eq!(updated.field("status"), Some(&json!("accepted")));
    assert_eq!(updated.field("customer"), Some(&json!("Acme")));

    let cached = t
        .engine
        .get_cached(&Collection::leads(), &entity("L1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.field("status"), Some(&json!("accepted")));
    assert_eq!(t.remote.call_count(), 0);
    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_refresh_replaces_scope_and_clear_wipes_it() {
    let dir = TempDir::new().unwrap();
    let remote = seeded_remote();
    let t = open_engine(test_config(&dir), remote.clone()).await;
    t.engine.refresh(&Collection::leads()).await.unwrap();

    remote.seed(
        &Collection::leads(),
        vec![record("L9", json!({ "status": "new" }))],
    );
    let fresh = t.engine.refresh(&Collection::leads()).await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert!(t
        .engine
        .get_cached(&Collection::leads(), &entity("L1"))
        .await
        .unwrap()
        .is_none());

    t.engine.clear_cache().await.unwrap();
    assert!(t
        .engine
        .get_cached(&Collection::leads(), &entity("L9"))
        .await
        .unwrap()
        .is_none());
    assert!(t
        .engine
        .last_refreshed(&Collection::leads())
        .await
        .unwrap()
        .is_none());
    t.engine.shutdown().await;
}
