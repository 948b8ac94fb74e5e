//! Scoped similarity retrieval.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::document::{Chunk, Scope, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::filter::Filter;
use crate::schema::fields;
use crate::vectorstore::VectorStore;

/// Finds the chunks of one collection most similar to a question, restricted
/// to the `document_type` and `index_id` of a [`Scope`].
pub struct ScopedRetriever {
    store: Arc<dyn VectorStore>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    similarity_threshold: f32,
    reserved_collection: Option<String>,
}

impl ScopedRetriever {
    pub fn new(store: Arc<dyn VectorStore>, embedding_provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            embedding_provider,
            similarity_threshold: f32::NEG_INFINITY,
            reserved_collection: None,
        }
    }

    /// Treat `name` as absent. Used for the metadata index, which holds no chunks.
    pub fn excluding_collection(mut self, name: impl Into<String>) -> Self {
        self.reserved_collection = Some(name.into());
        self
    }

    /// Drop hits scoring below `threshold`. Without one every hit is kept.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// The filter that confines a search to `scope`.
    pub fn scope_filter(scope: &Scope) -> Filter {
        Filter::eq(fields::DOCUMENT_TYPE, scope.document_type.as_str())
            .and_eq(fields::INDEX_ID, scope.index_id.as_str())
    }

    /// Return up to `top_k` chunks in `scope`, most similar first.
    ///
    /// A scope that matches no chunks yields an empty `Vec`, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CollectionNotFound`] if the collection does not exist
    /// or is the excluded one, otherwise any embedding or store error.
    pub async fn retrieve(
        &self,
        scope: &Scope,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let collection = scope.collection_name.as_str();
        if self.reserved_collection.as_deref() == Some(collection)
            || !self.store.exists(collection).await?
        {
            return Err(RagError::CollectionNotFound(collection.to_string()));
        }

        let embedding = self.embedding_provider.embed(question).await?;
        let hits = self.store.search(collection, &embedding, &Self::scope_filter(scope), top_k).await?;

        let total = hits.len();
        let results: Vec<SearchResult> = hits
            .into_iter()
            .filter(|hit| hit.score >= self.similarity_threshold)
            .filter_map(|hit| match Chunk::from_payload(&hit.payload) {
                Some(chunk) => Some(SearchResult { chunk, score: hit.score }),
                None => {
                    warn!(collection, "skipping stored row without text");
                    None
                }
            })
            .collect();

        debug!(collection, total, kept = results.len(), "retrieved chunks");
        Ok(results)
    }
}
