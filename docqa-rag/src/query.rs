//! Streaming question answering.
//!
//! [`QueryPipeline::answer`] retrieves context for a question, builds one
//! prompt and returns an [`Answer`]: the [`Source`]s the context came from and
//! the model's reply as a stream of [`Increment`]s. A missing collection is
//! reported before any stream exists; every later failure arrives in-band as a
//! final [`Increment::Error`].

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::RagConfig;
use crate::document::{Scope, Source};
use crate::error::{RagError, Result};
use crate::generation::{GenerationOptions, GenerationProvider};
use crate::prompt::PromptTemplate;
use crate::retriever::ScopedRetriever;

/// Prefix that marks an error increment in plain-text transports.
pub const ERROR_MARKER: &str = "[ERROR]";

/// One question, scoped to a collection, document type and index id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(flatten)]
    pub scope: Scope,
    /// Overrides the configured default temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Overrides the configured default generation length limit.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// One unit of an answer stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Increment {
    /// A piece of answer text.
    Text(String),
    /// A terminal failure. Nothing follows it.
    Error(String),
}

impl Increment {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Render for transports that only carry strings: errors become `[ERROR] <message>`.
    pub fn to_marker_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Error(message) => format!("{ERROR_MARKER} {message}"),
        }
    }
}

/// A lazy answer. Dropping it cancels generation.
pub type AnswerStream = Pin<Box<dyn Stream<Item = Increment> + Send>>;

/// A started answer: where its context came from, and the text still to come.
///
/// `Answer` is itself a stream of the increments, so dropping it cancels
/// generation too.
pub struct Answer {
    /// The retrieved chunks the prompt was built from, most similar first.
    /// Empty when retrieval failed.
    pub sources: Vec<Source>,
    pub increments: AnswerStream,
}

impl Answer {
    fn failed(increment: Increment) -> Self {
        Self { sources: Vec::new(), increments: Box::pin(futures::stream::iter([increment])) }
    }
}

impl Stream for Answer {
    type Item = Increment;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Increment>> {
        self.get_mut().increments.as_mut().poll_next(cx)
    }
}

/// Composes scoped retrieval, prompt assembly and streaming generation.
pub struct QueryPipeline {
    config: RagConfig,
    retriever: ScopedRetriever,
    generator: Arc<dyn GenerationProvider>,
    template: PromptTemplate,
}

impl QueryPipeline {
    pub fn new(
        config: RagConfig,
        retriever: ScopedRetriever,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        let retriever = retriever.excluding_collection(config.metadata_collection.as_str());
        Self { config, retriever, generator, template: PromptTemplate::default() }
    }

    /// Replace the default prompt template.
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Answer `request` as a stream of increments, with the sources behind it.
    ///
    /// Retrieval runs before this returns, so a missing collection never starts
    /// generation and the sources are known up front. Any other failure yields
    /// a stream holding a single
    /// [`Increment::Error`]; a generation failure part way through ends the
    /// stream with one [`Increment::Error`] after the text already produced.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] for a blank question or scope and
    /// [`RagError::CollectionNotFound`] if the collection does not exist or is
    /// the metadata collection.
    pub async fn answer(&self, request: QueryRequest) -> Result<Answer> {
        request.scope.validate()?;
        if request.question.trim().is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".to_string()));
        }
        let collection = request.scope.collection_name.clone();

        let results =
            match self.retriever.retrieve(&request.scope, &request.question, self.config.top_k).await {
                Ok(results) => results,
                Err(RagError::CollectionNotFound(name)) => {
                    warn!(collection = %name, "query against missing collection");
                    return Err(RagError::CollectionNotFound(name));
                }
                Err(e) => {
                    error!(collection = %collection, error = %e, "retrieval failed");
                    return Ok(Answer::failed(Increment::Error(e.to_string())));
                }
            };

        let sources: Vec<Source> = results.iter().map(Source::from).collect();
        let prompt = self.template.render(&results, &request.question);
        let options = GenerationOptions {
            temperature: request.temperature.unwrap_or(self.config.default_temperature),
            max_tokens: request.max_tokens.unwrap_or(self.config.default_max_tokens),
        };
        info!(
            collection = %collection,
            context_chunks = results.len(),
            model = self.generator.name(),
            "answering question"
        );

        let generator = Arc::clone(&self.generator);
        let stream = stream! {
            let mut text = match generator.generate(&prompt, options).await {
                Ok(text) => text,
                Err(e) => {
                    error!(collection = %collection, error = %e, "generation failed to start");
                    yield Increment::Error(e.to_string());
                    return;
                }
            };

            let mut count = 0usize;
            while let Some(item) = text.next().await {
                match item {
                    Ok(piece) => {
                        count += 1;
                        yield Increment::Text(piece);
                    }
                    Err(e) => {
                        error!(collection = %collection, increments = count, error = %e, "generation failed mid-stream");
                        yield Increment::Error(e.to_string());
                        return;
                    }
                }
            }
            debug!(collection = %collection, increments = count, "answer complete");
        };

        Ok(Answer { sources, increments: Box::pin(stream) })
    }
}
