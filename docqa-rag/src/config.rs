//! Configuration for ingestion, retrieval and generation.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Name of the collection holding one record per ingested file.
pub const DEFAULT_METADATA_COLLECTION: &str = "DocumentMetadata";

/// Configuration parameters shared by the ingestion and query pipelines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved as context for one question.
    pub top_k: usize,
    /// Minimum similarity score for retrieved chunks.
    pub similarity_threshold: f32,
    /// Collection used by the metadata index.
    pub metadata_collection: String,
    /// Sampling temperature used when a query does not set one.
    pub default_temperature: f32,
    /// Generation length limit used when a query does not set one.
    pub default_max_tokens: u32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_overlap: 128,
            top_k: 10,
            similarity_threshold: 0.0,
            metadata_collection: DEFAULT_METADATA_COLLECTION.to_string(),
            default_temperature: 0.7,
            default_max_tokens: 4096,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for retrieved chunks.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the collection used by the metadata index.
    pub fn metadata_collection(mut self, name: impl Into<String>) -> Self {
        self.config.metadata_collection = name.into();
        self
    }

    /// Set the fallback sampling temperature.
    pub fn default_temperature(mut self, temperature: f32) -> Self {
        self.config.default_temperature = temperature;
        self
    }

    /// Set the fallback generation length limit.
    pub fn default_max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.default_max_tokens = max_tokens;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `metadata_collection` is blank
    /// - `default_temperature` is outside `0.0..=2.0`
    /// - `default_max_tokens == 0`
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if config.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        if config.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if config.metadata_collection.trim().is_empty() {
            return Err(RagError::ConfigError("metadata_collection must not be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&config.default_temperature) {
            return Err(RagError::ConfigError(format!(
                "default_temperature ({}) must be between 0.0 and 2.0",
                config.default_temperature
            )));
        }
        if config.default_max_tokens == 0 {
            return Err(RagError::ConfigError(
                "default_max_tokens must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }
}
