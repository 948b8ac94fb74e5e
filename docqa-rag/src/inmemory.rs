//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a dependency-free gateway
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and small-scale use cases.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::ScoredPayload;
use crate::error::{RagError, Result};
use crate::filter::{Filter, Payload};
use crate::schema::CollectionSchema;
use crate::vectorstore::{VectorStore, project};

const BACKEND: &str = "InMemory";

#[derive(Debug)]
struct Row {
    payload: Payload,
    vector: Option<Vec<f32>>,
}

#[derive(Debug)]
struct MemoryCollection {
    schema: CollectionSchema,
    rows: Vec<Row>,
}

/// An in-memory [`VectorStore`] using cosine similarity for search.
///
/// Rows are kept in insertion order, so ties in similarity are returned in the
/// order they were inserted.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{CollectionSchema, InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.ensure_collection("docs", &CollectionSchema::chunks(384)).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored in `collection`, or `None` if it does not exist.
    pub async fn len(&self, collection: &str) -> Option<usize> {
        self.collections.read().await.get(collection).map(|c| c.rows.len())
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn write_error(message: String) -> RagError {
    RagError::StoreWrite { backend: BACKEND.to_string(), message }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn ensure_collection(&self, name: &str, schema: &CollectionSchema) -> Result<()> {
        let mut collections = self.collections.write().await;
        match collections.get(name) {
            Some(existing) if existing.schema != *schema => Err(RagError::Schema {
                collection: name.to_string(),
                message: "collection exists with a different schema".to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                collections.insert(
                    name.to_string(),
                    MemoryCollection { schema: schema.clone(), rows: Vec::new() },
                );
                Ok(())
            }
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn insert(
        &self,
        collection: &str,
        payload: Payload,
        vector: Option<Vec<f32>>,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections
            .get_mut(collection)
            .ok_or_else(|| write_error(format!("collection '{collection}' does not exist")))?;

        match (store.schema.dimensions, &vector) {
            (Some(expected), Some(v)) if v.len() != expected => {
                return Err(write_error(format!(
                    "vector has {} dimensions, collection '{collection}' expects {expected}",
                    v.len()
                )));
            }
            (Some(_), None) => {
                return Err(write_error(format!("collection '{collection}' requires a vector")));
            }
            _ => {}
        }

        store.rows.push(Row { payload, vector });
        Ok(())
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections
            .get_mut(collection)
            .ok_or_else(|| write_error(format!("collection '{collection}' does not exist")))?;
        store.rows.retain(|row| !filter.matches(&row.payload));
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &Filter,
        top_k: usize,
    ) -> Result<Vec<ScoredPayload>> {
        let collections = self.collections.read().await;
        let store = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        let mut scored: Vec<ScoredPayload> = store
            .rows
            .iter()
            .filter(|row| filter.matches(&row.payload))
            .filter_map(|row| {
                let stored = row.vector.as_deref()?;
                let score = cosine_similarity(stored, vector);
                Some(ScoredPayload { payload: row.payload.clone(), score })
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn fetch(
        &self,
        collection: &str,
        filter: &Filter,
        fields: &[&str],
    ) -> Result<Vec<Payload>> {
        let collections = self.collections.read().await;
        let store = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        Ok(store
            .rows
            .iter()
            .filter(|row| filter.matches(&row.payload))
            .map(|row| project(&row.payload, fields))
            .collect())
    }
}
