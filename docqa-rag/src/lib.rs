//! # docqa-rag
//!
//! Scoped retrieval-augmented question answering over PDF collections.
//!
//! ## Overview
//!
//! Documents are uploaded into named collections and tagged with a document
//! type and an index id. Questions are answered from the chunks of one
//! collection that share the question's tags, and the answer is streamed back
//! as it is generated.
//!
//! - [`IngestionPipeline`] - extract, chunk, embed and store one uploaded file
//! - [`MetadataIndex`] - record uploads and list collections, tags and files
//! - [`ScopedRetriever`] - similarity search restricted to one scope
//! - [`QueryPipeline`] - retrieval, prompt assembly and streaming generation
//! - [`VectorStore`] - the gateway trait, with [`InMemoryVectorStore`] and a
//!   Qdrant backend
//!
//! ## Features
//!
//! | Feature | Provides |
//! |---------|----------|
//! | `qdrant` | `qdrant::QdrantVectorStore` |
//! | `ollama` | `ollama::OllamaEmbeddingProvider`, `ollama::OllamaGenerationProvider` |
//! | `pdf` | `loader::PdfLoader` |
//! | `full` | all of the above |

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod generation;
pub mod ingest;
pub mod inmemory;
pub mod loader;
pub mod metadata;
pub mod prompt;
pub mod query;
pub mod retriever;
pub mod schema;
pub mod scratch;
pub mod vectorstore;

#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use chunking::{Chunker, RecursiveChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, FileEntry, MetadataRecord, Page, Scope, ScoredPayload, SearchResult, Source,
};
pub use embedding::EmbeddingProvider;
pub use error::{IngestStage, RagError, Result};
pub use filter::{Filter, Payload};
pub use generation::{GenerationOptions, GenerationProvider, TextStream};
pub use ingest::{IngestReport, IngestionPipeline, IngestionPipelineBuilder, Upload};
pub use inmemory::InMemoryVectorStore;
pub use loader::DocumentLoader;
#[cfg(feature = "pdf")]
pub use loader::PdfLoader;
pub use metadata::MetadataIndex;
pub use prompt::PromptTemplate;
pub use query::{Answer, AnswerStream, Increment, QueryPipeline, QueryRequest};
pub use retriever::ScopedRetriever;
pub use schema::CollectionSchema;
pub use vectorstore::VectorStore;
