//! Live integration tests for the Postgres document backend using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database from the sqlx
//! test harness. They need `DATABASE_URL` and are ignored by default; run
//! them with `cargo test -p xcellent-db -- --ignored`.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use xcellent_core::DailyAggregate;
use xcellent_db::{DocumentOp, DocumentStore, PgDocumentStore, SnapshotStore};

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn put_get_delete_round_trip(pool: sqlx::PgPool) {
    let store = PgDocumentStore::new(pool);

    store
        .put("daily/2024-05-01", json!({"impressions": 3}))
        .await
        .expect("put");
    store
        .put("daily/2024-05-01", json!({"impressions": 4}))
        .await
        .expect("overwrite");

    assert_eq!(
        store.get("daily/2024-05-01").await.expect("get"),
        Some(json!({"impressions": 4}))
    );
    assert!(store.delete("daily/2024-05-01").await.expect("delete"));
    assert!(!store.delete("daily/2024-05-01").await.expect("delete again"));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn list_keys_by_prefix_is_ordered(pool: sqlx::PgPool) {
    let store = PgDocumentStore::new(pool);
    for key in ["daily/2024-05-10", "daily/2024-05-02", "daily_/x", "item/1"] {
        store.put(key, json!({})).await.expect("put");
    }

    let keys = store.list_keys_by_prefix("daily/").await.expect("list");
    assert_eq!(keys, vec!["daily/2024-05-02", "daily/2024-05-10"]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn snapshot_store_runs_on_postgres(pool: sqlx::PgPool) {
    let store = SnapshotStore::new(Arc::new(PgDocumentStore::new(pool)));
    let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

    let mut agg = DailyAggregate::empty(date);
    agg.delta.impressions = 42;
    let mut writer = store.writer().await;
    writer.put_daily(&agg).expect("stage daily");
    writer.commit().await.expect("commit");

    let loaded = store.daily(date).await.expect("read").expect("present");
    assert_eq!(loaded, agg);
    store.ping().await.expect("ping");
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn apply_commits_a_batch_in_one_transaction(pool: sqlx::PgPool) {
    let store = PgDocumentStore::new(pool);
    store.put("item/1", json!({"old": true})).await.expect("put");

    store
        .apply(vec![
            ("item/1".to_owned(), DocumentOp::Delete),
            ("item/2".to_owned(), DocumentOp::Put(json!({"id": "2"}))),
        ])
        .await
        .expect("apply");

    assert_eq!(
        store.list_keys_by_prefix("item/").await.expect("list"),
        vec!["item/2"]
    );
}
