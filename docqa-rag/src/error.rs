//! Error types for the `docqa-rag` crate.

use std::fmt;

use thiserror::Error;

/// The step of an ingestion run that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    /// Creating or validating the target collection schema.
    SchemaEnsure,
    /// Writing the upload to a scratch file.
    Acquire,
    /// Extracting page text from the uploaded file.
    Extract,
    /// Computing chunk embeddings.
    Embed,
    /// Inserting chunks into the vector store.
    Store,
    /// Recording the upload in the metadata index.
    RecordMetadata,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SchemaEnsure => "schema",
            Self::Acquire => "acquire",
            Self::Extract => "extract",
            Self::Embed => "embed",
            Self::Store => "store",
            Self::RecordMetadata => "metadata",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in retrieval, ingestion and discovery operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// The vector store could not be reached or did not answer.
    #[error("Vector store connection error ({backend}): {message}")]
    StoreConnection {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A collection schema could not be created or conflicts with the existing one.
    #[error("Schema error in collection '{collection}': {message}")]
    Schema {
        /// The collection whose schema was rejected.
        collection: String,
        /// A description of the conflict.
        message: String,
    },

    /// A row could not be written to the vector store.
    #[error("Vector store write error ({backend}): {message}")]
    StoreWrite {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The requested collection does not exist.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// An ingestion run was aborted. Completed writes have been compensated.
    #[error("Ingestion into '{collection}' failed at {stage}: {message}")]
    IngestionFailed {
        /// The target collection.
        collection: String,
        /// The step that failed.
        stage: IngestStage,
        /// The originating cause.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation capability failed to start or failed mid-stream.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Page text could not be extracted from an uploaded file.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// A caller-supplied value was rejected.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RagError {
    /// Returns `true` when the error was caused by the caller rather than the service.
    ///
    /// Ingestion failures count as caller faults only when the uploaded file itself
    /// could not be read.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::CollectionNotFound(_) | Self::InvalidInput(_) | Self::ExtractionError(_) => true,
            Self::IngestionFailed { stage, .. } => *stage == IngestStage::Extract,
            _ => false,
        }
    }

    pub(crate) fn ingestion(collection: &str, stage: IngestStage, cause: impl fmt::Display) -> Self {
        Self::IngestionFailed { collection: collection.to_string(), stage, message: cause.to_string() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
