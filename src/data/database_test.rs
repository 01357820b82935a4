//! SQLite triple store tests

use super::database::SqliteTripleStore;
use super::triple::{TripleStore, TypedRdfTriple, XSD_DATE_TIME, conformance};
use std::sync::Arc;
use tempfile::TempDir;

/// Helper to create a test store
async fn create_test_store() -> (SqliteTripleStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let store = SqliteTripleStore::connect(&db_path).await.unwrap();
    (store, temp_dir)
}

#[tokio::test]
async fn test_store_connection() {
    let (store, _temp_dir) = create_test_store().await;
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_select_by_pattern() {
    let (store, _temp_dir) = create_test_store().await;
    conformance::select_by_pattern(&store).await;
}

#[tokio::test]
async fn test_store_is_idempotent() {
    let (store, _temp_dir) = create_test_store().await;
    conformance::store_is_idempotent(&store).await;
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (store, _temp_dir) = create_test_store().await;
    conformance::delete_is_idempotent(&store).await;
}

#[tokio::test]
async fn test_rejects_partial_triples() {
    let (store, _temp_dir) = create_test_store().await;
    conformance::rejects_partial_triples(&store).await;
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_object_types_are_preserved() {
    let (store, _temp_dir) = create_test_store().await;
    conformance::object_types_are_preserved(&store).await;
}

#[tokio::test]
async fn test_empty_object_type_is_untyped() {
    let (store, _temp_dir) = create_test_store().await;
    conformance::empty_object_type_is_untyped(&store).await;
}

#[tokio::test]
async fn test_untyped_and_typed_literals_are_distinct_rows() {
    let (store, _temp_dir) = create_test_store().await;
    let untyped = TypedRdfTriple::new("s", "p", "2014-01-05T21:31:40Z");
    let typed = untyped.clone().with_object_type(XSD_DATE_TIME);

    store.store_triple(&untyped).await.unwrap();
    store.store_triple(&typed).await.unwrap();
    store.store_triple(&untyped).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);

    let found = store
        .select(&TypedRdfTriple::pattern(Some("s"), None, None))
        .await
        .unwrap();
    assert!(found.contains(&untyped));
    assert!(found.contains(&typed));
}

#[tokio::test]
async fn test_triples_survive_reconnect() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("graph.db");

    {
        let store = SqliteTripleStore::connect(&db_path).await.unwrap();
        store
            .store_triple(&TypedRdfTriple::reference("s", "p", "https://example.com/o"))
            .await
            .unwrap();
        store.pool().close().await;
    }

    let store = SqliteTripleStore::connect(&db_path).await.unwrap();
    let found = store.select(&TypedRdfTriple::any()).await.unwrap();
    assert_eq!(
        found,
        vec![TypedRdfTriple::reference("s", "p", "https://example.com/o")]
    );
}

#[tokio::test]
async fn test_concurrent_stores_of_same_triple() {
    let (store, _temp_dir) = create_test_store().await;
    let store = Arc::new(store);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .store_triple(&TypedRdfTriple::new("s", "p", "o"))
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(store.count().await.unwrap(), 1);
}
