// engine_tests.rs - End-to-end drain scenarios against a stub server

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::db::entity_queries;
use crate::db::{conflict_queries, Database};
use crate::engine::{EngineConfig, SyncEngine};
use crate::queue::{OperationKind, OperationMetadata};
use crate::services::NewItem;
use crate::testutil::{sample_item, StubRemote, StubSessions};

async fn engine_with(
    remote: Arc<StubRemote>,
    sessions: Arc<StubSessions>,
    config: EngineConfig,
) -> Arc<SyncEngine> {
    let db = Database::in_memory().await.unwrap();
    let engine = SyncEngine::new(db, remote, sessions, config)
        .await
        .unwrap();
    engine.context().set("user-1", "acct-1").await.unwrap();
    Arc::new(engine)
}

async fn default_engine() -> (Arc<StubRemote>, Arc<StubSessions>, Arc<SyncEngine>) {
    let remote = Arc::new(StubRemote::default());
    let sessions = Arc::new(StubSessions::default());
    let engine = engine_with(remote.clone(), sessions.clone(), EngineConfig::default()).await;
    (remote, sessions, engine)
}

#[tokio::test]
async fn offline_create_then_online_sync() {
    let (_remote, _sessions, engine) = default_engine().await;

    // Start offline
    assert!(!engine.gate().is_online());

    let item = engine
        .items()
        .create_item(NewItem {
            project_id: Some("proj-123".to_string()),
            name: "Offline Item".to_string(),
            description: Some("Created while offline".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(engine.queue().len().await, 1);
    let local = entity_queries::get_item(&engine.database().pool, &item.item_id)
        .await
        .unwrap()
        .unwrap();
    assert!(local.last_synced_at.is_none());

    // Go online and drain once
    engine.gate().set_online(true);
    let report = engine.process_queue().await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(engine.queue().len().await, 0);

    let synced = entity_queries::items_by_project(&engine.database().pool, "proj-123")
        .await
        .unwrap();
    assert_eq!(synced.len(), 1);
    assert_eq!(synced[0].name, "Offline Item");
    assert_eq!(synced[0].version, 1);
    let stamped = synced[0].last_synced_at.expect("must be stamped");
    assert!(stamped >= synced[0].last_updated);
}

#[tokio::test]
async fn sync_failure_increments_retry_and_keeps_operation() {
    let (remote, _sessions, engine) = default_engine().await;

    engine
        .items()
        .create_item(NewItem {
            project_id: Some("proj-123".to_string()),
            name: "Offline Item".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    remote.fail_next_upserts(1);
    engine.gate().set_online(true);
    let report = engine.process_queue().await.unwrap();
    assert_eq!(report.failed, 1);

    let pending = engine.queue().pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].retry_count, 1);
    assert_eq!(pending[0].last_error.as_deref(), Some("Sync failed"));
}

#[tokio::test]
async fn offline_drain_is_a_no_op() {
    let (_remote, _sessions, engine) = default_engine().await;

    engine
        .items()
        .create_item(NewItem {
            name: "Waiting".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let report = engine.process_queue().await.unwrap();
    assert_eq!(report.completed, 0);
    assert_eq!(engine.queue().len().await, 1);
}

#[tokio::test]
async fn same_account_operations_reach_server_in_timestamp_order() {
    let (remote, _sessions, engine) = default_engine().await;

    let t0 = Utc::now() - chrono::Duration::seconds(30);
    // Enqueue out of order; delivery must follow timestamps
    for n in [2_i64, 0, 1] {
        engine
            .queue()
            .add(
                OperationKind::UpdateItem {
                    item: sample_item(&format!("item-{}", n), "acct-1"),
                },
                Some(OperationMetadata {
                    timestamp: Some(t0 + chrono::Duration::seconds(n)),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();
    }

    engine.gate().set_online(true);
    let report = engine.process_queue().await.unwrap();
    assert_eq!(report.completed, 3);

    assert_eq!(remote.delivered(), vec!["item-0", "item-1", "item-2"]);
}

#[tokio::test]
async fn open_conflict_blocks_updates_but_not_creates() {
    let (_remote, _sessions, engine) = default_engine().await;
    let pool = &engine.database().pool;

    // A stored open conflict names item-1
    let mut local = sample_item("item-1", "acct-1");
    local.name = "Local Name".to_string();
    entity_queries::save_item(pool, &local, entity_queries::WriteSource::LocalEdit)
        .await
        .unwrap();
    let mut server = local.clone();
    server.name = "Server Name".to_string();
    seed_conflict(pool, &local, &server).await;

    // One gated update for item-1, one unrelated create
    engine.items().update_item(local.clone()).await.unwrap();
    engine
        .items()
        .create_item(NewItem {
            name: "Fresh item".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    engine.gate().set_online(true);
    let report = engine.process_queue().await.unwrap();

    assert_eq!(report.blocked, 1);
    assert_eq!(report.completed, 1);

    let pending = engine.queue().pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind.op_type(), "UPDATE_ITEM");
    assert_eq!(pending[0].retry_count, 0);
    assert_eq!(pending[0].last_error.as_deref(), Some("Blocked by conflict"));
}

#[tokio::test]
async fn stale_version_rejection_records_conflict_and_keeps_operation() {
    let (remote, _sessions, engine) = default_engine().await;
    engine.gate().set_online(true);

    let item = engine
        .items()
        .create_item(NewItem {
            name: "Versioned".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    engine.process_queue().await.unwrap();
    assert_eq!(engine.queue().len().await, 0);

    // Another client advanced the row; our next update is stale
    let mut stale = item.clone();
    stale.notes = Some("local edit".to_string());
    engine.items().update_item(stale).await.unwrap();
    remote.conflict_next_upserts(1);

    let report = engine.process_queue().await.unwrap();
    assert_eq!(report.conflicts, 1);
    assert_eq!(engine.queue().len().await, 1);

    let conflicts = conflict_queries::open_for_account(&engine.database().pool, "acct-1")
        .await
        .unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].entity_id, item.item_id);

    // Next pass the gate holds it instead of burning retries
    let report = engine.process_queue().await.unwrap();
    assert_eq!(report.blocked, 1);
    let pending = engine.queue().pending().await.unwrap();
    assert_eq!(pending[0].retry_count, 0);
}

#[tokio::test]
async fn drain_refreshes_session_near_expiry() {
    let (_remote, sessions, engine) = default_engine().await;
    sessions.expire_soon();

    engine
        .items()
        .create_item(NewItem {
            name: "Any".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    engine.gate().set_online(true);
    engine.process_queue().await.unwrap();

    assert_eq!(sessions.refresh_count(), 1);
    assert_eq!(engine.queue().len().await, 0);
}

#[tokio::test]
async fn background_loop_drains_on_online_transition() {
    let remote = Arc::new(StubRemote::default());
    let sessions = Arc::new(StubSessions::default());
    let engine = engine_with(
        remote.clone(),
        sessions,
        EngineConfig {
            drain_interval: Duration::from_millis(50),
            ..Default::default()
        },
    )
    .await;

    engine
        .items()
        .create_item(NewItem {
            name: "Background".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let handle = engine.start_drain_loop();
    engine.gate().set_online(true);

    // Give the loop a few ticks to pick the work up
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if engine.queue().is_empty().await {
            break;
        }
    }
    assert!(engine.queue().is_empty().await);

    engine.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn delete_round_trip_removes_local_row() {
    let (remote, _sessions, engine) = default_engine().await;
    engine.gate().set_online(true);

    let item = engine
        .items()
        .create_item(NewItem {
            name: "Short-lived".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    engine.process_queue().await.unwrap();
    assert!(remote.server_item(&item.item_id).is_some());

    engine.items().delete_item(&item.item_id).await.unwrap();
    engine.process_queue().await.unwrap();

    assert!(remote.server_item(&item.item_id).is_none());
    assert!(entity_queries::get_item(&engine.database().pool, &item.item_id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(engine.queue().len().await, 0);
}

async fn seed_conflict(
    pool: &sqlx::SqlitePool,
    local: &crate::models::Item,
    server: &crate::models::Item,
) {
    use crate::conflict::{fingerprint, Conflict, ConflictSide, ConflictType};
    use crate::models::EntityType;

    let conflict = Conflict {
        fingerprint: fingerprint(
            EntityType::Item,
            &local.account_id,
            &local.item_id,
            ConflictType::Content,
            "name",
        ),
        account_id: local.account_id.clone(),
        entity_type: EntityType::Item,
        entity_id: local.item_id.clone(),
        conflict_type: ConflictType::Content,
        field: "name".to_string(),
        local: ConflictSide {
            data: serde_json::to_value(local).unwrap(),
            timestamp: local.last_updated,
            version: local.version,
        },
        server: ConflictSide {
            data: serde_json::to_value(server).unwrap(),
            timestamp: server.last_updated,
            version: server.version,
        },
        created_at: Utc::now(),
        resolved: false,
        resolution: None,
    };
    conflict_queries::upsert_conflict(pool, &conflict).await.unwrap();
}
