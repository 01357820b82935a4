//! E2E tests for local-origin dereferencing over the SQLite triple store

use std::sync::Arc;

use fedifetch::clock::{Clock, SystemClock};
use fedifetch::data::{
    MemoryCache, OBJECT_TYPE_IRI, RDF_TYPE, SqliteTripleStore, TripleStore,
    TripleStoreNodeSource, TypedRdfTriple, XSD_DATE_TIME,
};
use fedifetch::error::AppError;
use fedifetch::federation::{Dereferencer, ReqwestTransport, SignatureService};
use serde_json::json;
use tempfile::TempDir;

const NOTE: &str = "https://social.example.com/notes/1";
const AS: &str = "https://www.w3.org/ns/activitystreams#";

async fn setup() -> (Dereferencer, Arc<SqliteTripleStore>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(
        SqliteTripleStore::connect(&temp_dir.path().join("graph.db"))
            .await
            .unwrap(),
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let dereferencer = Dereferencer::new(
        // Never reached for local IRIs; refuses private hosts otherwise
        Arc::new(ReqwestTransport::new(reqwest::Client::new())),
        Arc::new(MemoryCache::new(clock.clone())),
        SignatureService::new(clock),
    )
    .with_local_source(
        "https://social.example.com",
        Arc::new(TripleStoreNodeSource::new(store.clone())),
    )
    .unwrap();

    (dereferencer, store, temp_dir)
}

#[tokio::test]
async fn test_stored_triples_dereference_as_node() {
    let (dereferencer, store, _temp_dir) = setup().await;

    store
        .store_triples(&[
            TypedRdfTriple::reference(NOTE, RDF_TYPE, format!("{AS}Note")),
            TypedRdfTriple::reference(
                NOTE,
                format!("{AS}attributedTo"),
                "https://social.example.com/users/alice",
            ),
            TypedRdfTriple::new(NOTE, format!("{AS}published"), "2014-01-05T21:31:40Z")
                .with_object_type(XSD_DATE_TIME),
        ])
        .await
        .unwrap();

    let node = dereferencer.dereference(NOTE).await.unwrap();
    assert_eq!(
        node,
        json!({
            "@id": NOTE,
            "@type": [format!("{AS}Note")],
            format!("{AS}attributedTo"): [{ "@id": "https://social.example.com/users/alice" }],
            format!("{AS}published"): [{
                "@value": "2014-01-05T21:31:40Z",
                "@type": XSD_DATE_TIME
            }]
        })
    );
}

#[tokio::test]
async fn test_local_reads_see_later_writes() {
    let (dereferencer, store, _temp_dir) = setup().await;

    assert!(matches!(
        dereferencer.dereference(NOTE).await,
        Err(AppError::NodeNotFound { .. })
    ));

    store
        .store_triple(&TypedRdfTriple::new(NOTE, format!("{AS}content"), "hi"))
        .await
        .unwrap();
    let node = dereferencer.dereference(NOTE).await.unwrap();
    assert_eq!(node[format!("{AS}content")][0]["@value"], "hi");

    store
        .delete_triple(&TypedRdfTriple::new(NOTE, format!("{AS}content"), "hi"))
        .await
        .unwrap();
    assert!(dereferencer.dereference(NOTE).await.is_err());
}

#[tokio::test]
async fn test_saved_node_round_trips() {
    let (dereferencer, store, _temp_dir) = setup().await;
    let source = TripleStoreNodeSource::new(store.clone());

    let node = json!({
        "@id": NOTE,
        "@type": [format!("{AS}Note")],
        format!("{AS}inReplyTo"): [{ "@id": "https://remote.example/notes/9" }],
        format!("{AS}content"): [{ "@value": "reply" }]
    });
    source.save(&node).await.unwrap();

    let references = store
        .select(&TypedRdfTriple::pattern(Some(NOTE), None, None).with_object_type(OBJECT_TYPE_IRI))
        .await
        .unwrap();
    assert_eq!(references.len(), 2);

    assert_eq!(dereferencer.dereference(NOTE).await.unwrap(), node);
}

#[tokio::test]
async fn test_remote_iri_does_not_fall_back_to_store() {
    let (dereferencer, store, _temp_dir) = setup().await;
    store
        .store_triple(&TypedRdfTriple::new("https://localhost/x", "p", "o"))
        .await
        .unwrap();

    // Not under the local origin, so the transport is used and refuses localhost
    assert!(matches!(
        dereferencer.dereference("https://localhost/x").await,
        Err(AppError::NodeNotFound { .. })
    ));
}
