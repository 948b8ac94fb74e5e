//! Ollama embedding and generation providers.
//!
//! Talks to an Ollama-compatible HTTP API: `/api/embed` for embeddings and
//! `/api/generate` with newline-delimited JSON streaming for answers.
//!
//! This module is only available when the `ollama` feature is enabled.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationOptions, GenerationProvider, TextStream};

/// The default Ollama endpoint.
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// The default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// The dimensionality of `nomic-embed-text`.
pub const DEFAULT_DIMENSIONS: usize = 768;

/// The default generation model.
pub const DEFAULT_GENERATION_MODEL: &str = "qwen3:8b";

const PROVIDER: &str = "Ollama";

fn endpoint(host: &str, path: &str) -> String {
    format!("{}/{path}", host.trim_end_matches('/'))
}

fn embedding_error(message: String) -> RagError {
    RagError::EmbeddingError { provider: PROVIDER.into(), message }
}

fn generation_error(message: String) -> RagError {
    RagError::GenerationError { provider: PROVIDER.into(), message }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Read a non-success response body and pull out Ollama's `error` message if present.
async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by Ollama's `/api/embed` endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::ollama::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::new("http://localhost:11434")
///     .with_model("nomic-embed-text")
///     .with_dimensions(768);
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    host: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for the Ollama server at `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
        }
    }

    /// Set the embedding model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the dimensionality the model produces.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| embedding_error("API returned no embedding".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let request_body = EmbedRequest { model: &self.model, input: texts.to_vec() };
        let response = self
            .client
            .post(endpoint(&self.host, "api/embed"))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "embedding request failed");
                embedding_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(provider = PROVIDER, %detail, "embedding API error");
            return Err(embedding_error(detail));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse embedding response");
            embedding_error(format!("failed to parse response: {e}"))
        })?;

        if parsed.embeddings.len() != texts.len() {
            return Err(embedding_error(format!(
                "API returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                texts.len()
            )));
        }
        if let Some(bad) = parsed.embeddings.iter().find(|e| e.len() != self.dimensions) {
            return Err(embedding_error(format!(
                "model '{}' returned {} dimensions, expected {}",
                self.model,
                bad.len(),
                self.dimensions
            )));
        }

        Ok(parsed.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ── Generation ─────────────────────────────────────────────────────

/// A [`GenerationProvider`] backed by Ollama's streaming `/api/generate` endpoint.
pub struct OllamaGenerationProvider {
    client: reqwest::Client,
    host: String,
    model: String,
}

impl OllamaGenerationProvider {
    /// Create a provider for the Ollama server at `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into(),
            model: DEFAULT_GENERATION_MODEL.into(),
        }
    }

    /// Set the generation model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Parse one NDJSON line. Returns the text increment, if any, and whether the
/// stream is finished.
fn parse_generate_line(line: &[u8]) -> Result<(Option<String>, bool)> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok((None, false));
    }
    let parsed: GenerateLine = serde_json::from_str(line)
        .map_err(|e| generation_error(format!("malformed stream line: {e}")))?;
    if let Some(message) = parsed.error {
        return Err(generation_error(message));
    }
    let text = (!parsed.response.is_empty()).then_some(parsed.response);
    Ok((text, parsed.done))
}

#[async_trait]
impl GenerationProvider for OllamaGenerationProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<TextStream> {
        debug!(provider = PROVIDER, model = %self.model, prompt_len = prompt.len(), "starting generation");

        let request_body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
            options: GenerateOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        let response = self
            .client
            .post(endpoint(&self.host, "api/generate"))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "generation request failed");
                generation_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(provider = PROVIDER, %detail, "generation API error");
            return Err(generation_error(detail));
        }

        let mut body = Box::pin(response.bytes_stream());
        let stream = try_stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut done = false;
            while !done {
                let Some(bytes) = body.next().await else { break };
                let bytes = bytes.map_err(|e| generation_error(format!("stream interrupted: {e}")))?;
                buffer.extend_from_slice(&bytes);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let (text, finished) = parse_generate_line(&line)?;
                    if let Some(text) = text {
                        yield text;
                    }
                    if finished {
                        done = true;
                        break;
                    }
                }
            }

            if !done {
                let (text, finished) = parse_generate_line(&buffer)?;
                if let Some(text) = text {
                    yield text;
                }
                if !finished {
                    Err::<(), _>(generation_error("stream ended before completion".into()))?;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_line_yields_text_until_done() {
        let (text, done) = parse_generate_line(br#"{"response":"The","done":false}"#).unwrap();
        assert_eq!(text.as_deref(), Some("The"));
        assert!(!done);

        let (text, done) = parse_generate_line(br#"{"response":"","done":true}"#).unwrap();
        assert!(text.is_none());
        assert!(done);
    }

    #[test]
    fn generate_line_surfaces_model_errors() {
        let err = parse_generate_line(br#"{"error":"model not found"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Generation error (Ollama): model not found");
        assert!(parse_generate_line(b"not json").is_err());
        assert_eq!(parse_generate_line(b"  \n").unwrap(), (None, false));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(endpoint("http://h:11434/", "api/embed"), "http://h:11434/api/embed");
    }

    #[test]
    fn generate_request_uses_ollama_option_names() {
        let body = GenerateRequest {
            model: "qwen3:8b",
            prompt: "hi",
            stream: true,
            options: GenerateOptions { temperature: 0.5, num_predict: 64 },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["options"]["num_predict"], 64);
        assert_eq!(json["stream"], true);
    }
}
