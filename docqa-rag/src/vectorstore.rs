//! The vector store gateway trait.

use async_trait::async_trait;

use crate::document::ScoredPayload;
use crate::error::Result;
use crate::filter::{Filter, Payload};
use crate::schema::CollectionSchema;

/// A storage backend for payloads with optional vectors.
///
/// One gateway instance is opened at process start, shared behind an `Arc` by
/// every component that reads or writes collections, and closed at shutdown.
/// Implementations perform every call against the store; nothing is cached.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{CollectionSchema, Filter, InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.ensure_collection("docs", &CollectionSchema::chunks(384)).await?;
/// store.insert("docs", payload, Some(embedding)).await?;
/// let hits = store.search("docs", &query, &Filter::eq("index_id", "a"), 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// A short backend name used in logs and errors.
    fn backend(&self) -> &str;

    /// Create the collection with `schema` if it does not exist.
    ///
    /// Idempotent. An existing collection is never altered; if its schema is
    /// incompatible with `schema` this returns [`RagError::Schema`].
    ///
    /// [`RagError::Schema`]: crate::error::RagError::Schema
    async fn ensure_collection(&self, name: &str, schema: &CollectionSchema) -> Result<()>;

    /// Returns `true` if the collection exists.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Names of every collection in the store.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Persist one row. `vector` must be set for collections with a vector field.
    async fn insert(&self, collection: &str, payload: Payload, vector: Option<Vec<f32>>)
    -> Result<()>;

    /// Delete every row matching `filter`.
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<()>;

    /// Return up to `top_k` rows matching `filter`, by descending similarity to `vector`.
    ///
    /// Ties are returned in backend order, which callers must treat as unspecified.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &Filter,
        top_k: usize,
    ) -> Result<Vec<ScoredPayload>>;

    /// Return the named fields of every row matching `filter`, in no particular order.
    async fn fetch(&self, collection: &str, filter: &Filter, fields: &[&str])
    -> Result<Vec<Payload>>;

    /// Release the connection. Further calls may fail.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Keep only `fields` of `payload`. An empty field list keeps everything.
pub(crate) fn project(payload: &Payload, fields: &[&str]) -> Payload {
    if fields.is_empty() {
        return payload.clone();
    }
    fields
        .iter()
        .filter_map(|field| payload.get(*field).map(|v| ((*field).to_string(), v.clone())))
        .collect()
}
