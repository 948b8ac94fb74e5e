//! Shared handler state and its construction from backends.

use std::path::PathBuf;
use std::sync::Arc;

use docqa_rag::ollama::{OllamaEmbeddingProvider, OllamaGenerationProvider};
use docqa_rag::qdrant::QdrantVectorStore;
use docqa_rag::{
    DocumentLoader, EmbeddingProvider, GenerationProvider, IngestionPipeline, MetadataIndex,
    PdfLoader, QueryPipeline, RagConfig, RecursiveChunker, ScopedRetriever, VectorStore,
};
use tracing::info;

use crate::config::Settings;

/// The external capabilities the service is assembled from.
pub struct Backends {
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn GenerationProvider>,
    pub loader: Arc<dyn DocumentLoader>,
}

impl Backends {
    /// Qdrant, Ollama and the PDF loader as configured by `settings`.
    pub fn from_settings(settings: &Settings) -> docqa_rag::Result<Self> {
        let store = QdrantVectorStore::connect(&settings.qdrant_url)?;
        let embedder = OllamaEmbeddingProvider::new(settings.ollama_host.as_str())
            .with_model(settings.embedding_model.as_str())
            .with_dimensions(settings.embedding_dimensions);
        let generator = OllamaGenerationProvider::new(settings.ollama_host.as_str())
            .with_model(settings.llm_model.as_str());

        Ok(Self {
            store: Arc::new(store),
            embedder: Arc::new(embedder),
            generator: Arc::new(generator),
            loader: Arc::new(PdfLoader),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn VectorStore>,
    pub metadata: Arc<MetadataIndex>,
    pub ingestion: Arc<IngestionPipeline>,
    pub query: Arc<QueryPipeline>,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Wire the pipelines over `backends` and create the metadata collection.
    pub async fn new(
        backends: Backends,
        config: RagConfig,
        scratch_dir: PathBuf,
        max_upload_bytes: usize,
    ) -> docqa_rag::Result<Self> {
        let Backends { store, embedder, generator, loader } = backends;

        let metadata =
            Arc::new(MetadataIndex::new(store.clone(), config.metadata_collection.as_str()));
        metadata.init().await?;

        let ingestion = IngestionPipeline::builder()
            .config(config.clone())
            .vector_store(store.clone())
            .metadata_index(metadata.clone())
            .embedding_provider(embedder.clone())
            .loader(loader)
            .chunker(Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)))
            .scratch_dir(scratch_dir)
            .build()?;

        let mut retriever = ScopedRetriever::new(store.clone(), embedder);
        if config.similarity_threshold > 0.0 {
            retriever = retriever.with_similarity_threshold(config.similarity_threshold);
        }
        let query = QueryPipeline::new(config, retriever, generator);

        info!(
            backend = store.backend(),
            metadata_collection = metadata.collection(),
            "service state ready"
        );
        Ok(Self {
            store,
            metadata,
            ingestion: Arc::new(ingestion),
            query: Arc::new(query),
            max_upload_bytes,
        })
    }
}
