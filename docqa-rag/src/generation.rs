//! Streaming text generation capability.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A lazy, single-pass sequence of generated text increments.
///
/// Dropping the stream stops generation and releases the underlying connection.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A language model that answers a prompt as a stream of text increments.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// The model name, for logs.
    fn name(&self) -> &str;

    /// Start generating an answer to `prompt`.
    ///
    /// Errors returned here mean generation never started. Errors yielded by the
    /// stream mean it failed part way; increments already yielded stand.
    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<TextStream>;
}
