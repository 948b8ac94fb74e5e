//! Discovery queries over the metadata index.

use std::sync::Arc;

use docqa_rag::config::DEFAULT_METADATA_COLLECTION;
use docqa_rag::schema::CollectionSchema;
use docqa_rag::{InMemoryVectorStore, MetadataIndex, Scope, VectorStore};

async fn index() -> (Arc<InMemoryVectorStore>, MetadataIndex) {
    let store = Arc::new(InMemoryVectorStore::new());
    let index = MetadataIndex::new(store.clone(), DEFAULT_METADATA_COLLECTION);
    index.init().await.unwrap();
    (store, index)
}

#[tokio::test]
async fn init_is_idempotent() {
    let (store, index) = index().await;
    index.init().await.unwrap();
    assert_eq!(store.list_collections().await.unwrap(), vec![DEFAULT_METADATA_COLLECTION]);
    assert!(index.list_collections().await.unwrap().is_empty());
}

#[tokio::test]
async fn distinct_values_are_per_collection_and_sorted() {
    let (_, index) = index().await;
    for (collection, document_type, index_id) in [
        ("manuals", "service", "2024"),
        ("manuals", "service", "2023"),
        ("manuals", "parts", "2024"),
        ("contracts", "lease", "x1"),
    ] {
        index.record_upload(&Scope::new(collection, document_type, index_id), "f.pdf").await.unwrap();
    }

    let ids: Vec<String> = index.list_index_ids("manuals").await.unwrap().into_iter().collect();
    assert_eq!(ids, ["2023", "2024"]);
    let types: Vec<String> =
        index.list_document_types("manuals").await.unwrap().into_iter().collect();
    assert_eq!(types, ["parts", "service"]);
    assert!(index.list_index_ids("unknown").await.unwrap().is_empty());
}

#[tokio::test]
async fn files_match_the_exact_scope_oldest_first() {
    let (_, index) = index().await;
    let scope = Scope::new("manuals", "service", "2024");
    let first = index.record_upload(&scope, "b.pdf").await.unwrap();
    let second = index.record_upload(&scope, "a.pdf").await.unwrap();
    index.record_upload(&Scope::new("manuals", "service", "2023"), "other.pdf").await.unwrap();
    index.record_upload(&Scope::new("manuals", "parts", "2024"), "other.pdf").await.unwrap();

    let files = index.list_files(&scope).await.unwrap();

    assert_eq!(files.len(), 2);
    assert!(first.upload_date <= second.upload_date);
    assert!(files[0].upload_date <= files[1].upload_date);
    assert!(files.iter().all(|f| f.filename != "other.pdf"));
}

#[tokio::test]
async fn collections_exclude_the_index_itself() {
    let (store, index) = index().await;
    store.ensure_collection("manuals", &CollectionSchema::chunks(4)).await.unwrap();
    store.ensure_collection("contracts", &CollectionSchema::chunks(4)).await.unwrap();

    let names: Vec<String> = index.list_collections().await.unwrap().into_iter().collect();
    assert_eq!(names, ["contracts", "manuals"]);
}
