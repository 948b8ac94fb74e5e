//! Scripted stand-ins for the embedding, generation, loading and storage seams.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use docqa_rag::document::ScoredPayload;
use docqa_rag::error::{RagError, Result};
use docqa_rag::filter::{Filter, Payload};
use docqa_rag::generation::{GenerationOptions, GenerationProvider, TextStream};
use docqa_rag::loader::{DocumentLoader, split_pages};
use docqa_rag::schema::CollectionSchema;
use docqa_rag::{EmbeddingProvider, InMemoryVectorStore, Page, VectorStore};

pub const DIM: usize = 8;

/// Embeds text as a letter histogram folded into [`DIM`] buckets.
#[derive(Default)]
pub struct HistogramEmbedder {
    pub calls: AtomicUsize,
}

impl HistogramEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIM];
        for b in text.bytes().filter(u8::is_ascii_alphanumeric) {
            v[usize::from(b) % DIM] += 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HistogramEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(text))
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// An embedder whose every call fails.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::EmbeddingError {
            provider: "fake".into(),
            message: "embedding service unavailable".into(),
        })
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Reads the upload as UTF-8 text with form feeds between pages.
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> Result<Vec<Page>> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RagError::ExtractionError(format!("not a text file: {e}")))?;
        Ok(split_pages(&text))
    }
}

/// Yields a fixed list of increments, then optionally fails.
pub struct ScriptedGenerator {
    pieces: Vec<String>,
    failure: Option<String>,
    pub calls: AtomicUsize,
    pub last_prompt: std::sync::Mutex<Option<String>>,
    pub last_options: std::sync::Mutex<Option<GenerationOptions>>,
}

impl ScriptedGenerator {
    pub fn new(pieces: &[&str]) -> Self {
        Self {
            pieces: pieces.iter().map(|p| p.to_string()).collect(),
            failure: None,
            calls: AtomicUsize::new(0),
            last_prompt: std::sync::Mutex::new(None),
            last_options: std::sync::Mutex::new(None),
        }
    }

    pub fn failing_after(pieces: &[&str], message: &str) -> Self {
        Self { failure: Some(message.to_string()), ..Self::new(pieces) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<TextStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        *self.last_options.lock().unwrap() = Some(options);

        let mut items: Vec<Result<String>> = self.pieces.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.failure {
            items.push(Err(RagError::GenerationError {
                provider: "scripted".into(),
                message: message.clone(),
            }));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Wraps an [`InMemoryVectorStore`] and fails selected writes.
pub struct FlakyStore {
    pub inner: InMemoryVectorStore,
    /// Fail inserts into `fail_collection` once this many have succeeded.
    fail_after_inserts: Option<usize>,
    fail_collection: String,
    /// Apply the failing insert before reporting the error, like a write that
    /// times out on the client but lands on the server.
    apply_failed_insert: bool,
    inserts: AtomicUsize,
}

impl FlakyStore {
    pub fn failing_inserts(collection: &str, after: usize) -> Self {
        Self {
            inner: InMemoryVectorStore::new(),
            fail_after_inserts: Some(after),
            fail_collection: collection.to_string(),
            apply_failed_insert: false,
            inserts: AtomicUsize::new(0),
        }
    }

    /// Every insert into `collection` lands but reports a timeout.
    pub fn timing_out_inserts(collection: &str) -> Self {
        Self { apply_failed_insert: true, ..Self::failing_inserts(collection, 0) }
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    fn backend(&self) -> &str {
        "flaky"
    }

    async fn ensure_collection(&self, name: &str, schema: &CollectionSchema) -> Result<()> {
        self.inner.ensure_collection(name, schema).await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        self.inner.exists(name).await
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.inner.list_collections().await
    }

    async fn insert(
        &self,
        collection: &str,
        payload: Payload,
        vector: Option<Vec<f32>>,
    ) -> Result<()> {
        if collection == self.fail_collection {
            let done = self.inserts.fetch_add(1, Ordering::SeqCst);
            if self.fail_after_inserts.is_some_and(|limit| done >= limit) {
                if self.apply_failed_insert {
                    self.inner.insert(collection, payload, vector).await?;
                    return Err(RagError::StoreWrite {
                        backend: "flaky".into(),
                        message: "deadline exceeded".into(),
                    });
                }
                return Err(RagError::StoreWrite {
                    backend: "flaky".into(),
                    message: "disk full".into(),
                });
            }
        }
        self.inner.insert(collection, payload, vector).await
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<()> {
        self.inner.delete(collection, filter).await
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &Filter,
        top_k: usize,
    ) -> Result<Vec<ScoredPayload>> {
        self.inner.search(collection, vector, filter, top_k).await
    }

    async fn fetch(
        &self,
        collection: &str,
        filter: &Filter,
        fields: &[&str],
    ) -> Result<Vec<Payload>> {
        self.inner.fetch(collection, filter, fields).await
    }
}

pub fn shared<T: VectorStore + 'static>(store: T) -> Arc<dyn VectorStore> {
    Arc::new(store)
}
