//! Ingestion pipeline.
//!
//! The [`IngestionPipeline`] turns one uploaded file into tagged, embedded
//! chunks in the target collection plus one record in the [`MetadataIndex`]:
//!
//! 1. ensure the collection schema exists
//! 2. write the upload to a uniquely named scratch file
//! 3. extract pages, then release the scratch file
//! 4. split each page into chunks and tag them with the scope
//! 5. embed every chunk (nothing is written yet)
//! 6. insert the chunks in document order
//! 7. record the upload in the metadata index
//!
//! Steps 6 and 7 commit together: every chunk carries the run's `upload_id`,
//! and if any write fails the chunks already written are deleted before the
//! error is returned.
//!
//! # Example
//!
//! ```rust,ignore
//! let pipeline = IngestionPipeline::builder()
//!     .config(RagConfig::default())
//!     .vector_store(store.clone())
//!     .metadata_index(metadata.clone())
//!     .embedding_provider(Arc::new(embedder))
//!     .loader(Arc::new(PdfLoader))
//!     .build()?;
//!
//! let scope = Scope::new("manuals", "service", "2024");
//! let report = pipeline.ingest(&scope, Upload::new("pump.pdf", bytes)).await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Chunk, Page, Scope};
use crate::embedding::EmbeddingProvider;
use crate::error::{IngestStage, RagError, Result};
use crate::filter::Filter;
use crate::loader::DocumentLoader;
use crate::metadata::MetadataIndex;
use crate::schema::{CollectionSchema, fields};
use crate::scratch::ScratchFile;
use crate::vectorstore::VectorStore;

/// Chunks embedded per embedding request.
const EMBED_BATCH_SIZE: usize = 64;

/// An uploaded file.
#[derive(Debug, Clone)]
pub struct Upload {
    /// The caller-supplied filename.
    pub filename: String,
    /// The raw file content.
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { filename: filename.into(), bytes: bytes.into() }
    }
}

/// The outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub collection_name: String,
    pub filename: String,
    pub chunk_count: usize,
    /// Identifier shared by every chunk written in this run.
    pub upload_id: String,
}

impl IngestReport {
    /// Human-readable summary of the run.
    pub fn message(&self) -> String {
        format!("Stored {} chunks in {}", self.chunk_count, self.collection_name)
    }
}

/// The ingestion orchestrator. Construct one via [`IngestionPipeline::builder()`].
pub struct IngestionPipeline {
    config: RagConfig,
    store: Arc<dyn VectorStore>,
    metadata: Arc<MetadataIndex>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    loader: Arc<dyn DocumentLoader>,
    chunker: Arc<dyn Chunker>,
    scratch_dir: PathBuf,
}

impl IngestionPipeline {
    /// Create a new [`IngestionPipelineBuilder`].
    pub fn builder() -> IngestionPipelineBuilder {
        IngestionPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Ingest one uploaded file into the collection named by `scope`.
    ///
    /// A file with no extractable text stores zero chunks and still records one
    /// metadata entry.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] for a blank scope or filename or for the
    /// metadata collection's name, and
    /// [`RagError::IngestionFailed`] naming the collection, the failed step and
    /// its cause for anything else. No chunks from a failed run remain stored,
    /// unless the compensating delete itself fails (which is logged).
    pub async fn ingest(&self, scope: &Scope, upload: Upload) -> Result<IngestReport> {
        scope.validate()?;
        if scope.collection_name == self.config.metadata_collection {
            return Err(RagError::InvalidInput(format!(
                "collection name '{}' is reserved",
                scope.collection_name
            )));
        }
        if upload.filename.trim().is_empty() {
            return Err(RagError::InvalidInput("filename must not be empty".to_string()));
        }
        let collection = scope.collection_name.as_str();
        let filename = upload.filename.clone();

        // 1. Schema
        let schema = CollectionSchema::chunks(self.embedding_provider.dimensions());
        self.store.ensure_collection(collection, &schema).await.map_err(|e| {
            error!(collection, error = %e, "failed to ensure collection");
            RagError::ingestion(collection, IngestStage::SchemaEnsure, e)
        })?;

        // 2-3. Scratch file and extraction
        let pages = self.extract(collection, upload).await?;

        // 4. Chunk and tag
        let mut chunks = self.chunk_pages(scope, &filename, &pages);

        // 5. Embed
        self.embed_chunks(collection, &mut chunks).await?;

        // 6-7. Commit
        let upload_id = Uuid::new_v4().to_string();
        self.commit(scope, &filename, &upload_id, chunks.as_mut_slice()).await?;

        let chunk_count = chunks.len();
        info!(collection, filename = %filename, chunk_count, upload_id = %upload_id, "ingested document");

        Ok(IngestReport { collection_name: collection.to_string(), filename, chunk_count, upload_id })
    }

    async fn extract(&self, collection: &str, upload: Upload) -> Result<Vec<Page>> {
        let loader = Arc::clone(&self.loader);
        let dir = self.scratch_dir.clone();
        let owned_collection = collection.to_string();

        let task = tokio::task::spawn_blocking(move || {
            let scratch = ScratchFile::create(&dir, &upload.filename, &upload.bytes).map_err(|e| {
                RagError::ingestion(&owned_collection, IngestStage::Acquire, e)
            })?;
            let pages = loader
                .load(scratch.path())
                .map_err(|e| RagError::ingestion(&owned_collection, IngestStage::Extract, e));
            scratch.release();
            pages
        });

        task.await.map_err(|e| {
            RagError::ingestion(collection, IngestStage::Extract, format!("extraction task failed: {e}"))
        })?
    }

    fn chunk_pages(&self, scope: &Scope, filename: &str, pages: &[Page]) -> Vec<Chunk> {
        pages
            .iter()
            .flat_map(|page| {
                self.chunker.split(&page.text).into_iter().map(move |text| Chunk {
                    text,
                    source: filename.to_string(),
                    page: page.page,
                    document_type: scope.document_type.clone(),
                    index_id: scope.index_id.clone(),
                    filename: filename.to_string(),
                    embedding: Vec::new(),
                })
            })
            .collect()
    }

    async fn embed_chunks(&self, collection: &str, chunks: &mut [Chunk]) -> Result<()> {
        for batch in chunks.chunks_mut(EMBED_BATCH_SIZE) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embeddings = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
                error!(collection, error = %e, "embedding failed during ingestion");
                RagError::ingestion(collection, IngestStage::Embed, e)
            })?;
            if embeddings.len() != batch.len() {
                return Err(RagError::ingestion(
                    collection,
                    IngestStage::Embed,
                    format!("expected {} embeddings, got {}", batch.len(), embeddings.len()),
                ));
            }
            for (chunk, embedding) in batch.iter_mut().zip(embeddings) {
                chunk.embedding = embedding;
            }
        }
        Ok(())
    }

    async fn commit(
        &self,
        scope: &Scope,
        filename: &str,
        upload_id: &str,
        chunks: &mut [Chunk],
    ) -> Result<()> {
        let collection = scope.collection_name.as_str();

        for (written, chunk) in chunks.iter_mut().enumerate() {
            let vector = std::mem::take(&mut chunk.embedding);
            if let Err(e) = self.store.insert(collection, chunk.to_payload(upload_id), Some(vector)).await
            {
                error!(collection, upload_id, written, error = %e, "chunk insert failed");
                // A failed insert may still have landed.
                self.compensate(collection, upload_id).await;
                return Err(RagError::ingestion(collection, IngestStage::Store, e));
            }
        }

        if let Err(e) = self.metadata.record_upload(scope, filename).await {
            error!(collection, upload_id, error = %e, "failed to record upload");
            if !chunks.is_empty() {
                self.compensate(collection, upload_id).await;
            }
            return Err(RagError::ingestion(collection, IngestStage::RecordMetadata, e));
        }
        Ok(())
    }

    async fn compensate(&self, collection: &str, upload_id: &str) {
        let filter = Filter::eq(fields::UPLOAD_ID, upload_id);
        match self.store.delete(collection, &filter).await {
            Ok(()) => warn!(collection, upload_id, "removed chunks of failed upload"),
            Err(e) => error!(
                collection,
                upload_id,
                error = %e,
                "failed to remove chunks of failed upload; orphaned chunks remain"
            ),
        }
    }
}

/// Builder for constructing an [`IngestionPipeline`].
///
/// `chunker` defaults to a [`RecursiveChunker`] sized from the config and
/// `scratch_dir` to a `docqa` directory under the system temp dir; every
/// other field is required.
#[derive(Default)]
pub struct IngestionPipelineBuilder {
    config: Option<RagConfig>,
    store: Option<Arc<dyn VectorStore>>,
    metadata: Option<Arc<MetadataIndex>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    loader: Option<Arc<dyn DocumentLoader>>,
    chunker: Option<Arc<dyn Chunker>>,
    scratch_dir: Option<PathBuf>,
}

impl IngestionPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the vector store gateway.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the metadata index that records completed uploads.
    pub fn metadata_index(mut self, metadata: Arc<MetadataIndex>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the page loader.
    pub fn loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Override the chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the directory for scratch files.
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Build the [`IngestionPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing.
    pub fn build(self) -> Result<IngestionPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let metadata = self
            .metadata
            .ok_or_else(|| RagError::ConfigError("metadata_index is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let loader =
            self.loader.ok_or_else(|| RagError::ConfigError("loader is required".to_string()))?;
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap))
        });
        let scratch_dir = self.scratch_dir.unwrap_or_else(|| std::env::temp_dir().join("docqa"));

        Ok(IngestionPipeline {
            config,
            store,
            metadata,
            embedding_provider,
            loader,
            chunker,
            scratch_dir,
        })
    }
}
