//! Server settings read from the environment.

use std::path::PathBuf;
use std::str::FromStr;

use docqa_rag::config::DEFAULT_METADATA_COLLECTION;
use docqa_rag::{RagConfig, RagError, ollama, qdrant};
use thiserror::Error;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid { key: &'static str, value: String, reason: String },

    #[error(transparent)]
    Rag(#[from] RagError),
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub qdrant_url: String,
    pub ollama_host: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub llm_model: String,
    pub rag: RagConfig,
    pub scratch_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
}

impl Settings {
    /// Read settings from process environment variables.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`. Unset and blank variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let string = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let port = match get("DOCQA_PORT") {
            Some(value) => parse_value("DOCQA_PORT", value)?,
            None => parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
        };

        let defaults = RagConfig::default();
        let rag = RagConfig::builder()
            .chunk_size(parse_or("CHUNK_SIZE", get("CHUNK_SIZE"), defaults.chunk_size)?)
            .chunk_overlap(parse_or("CHUNK_OVERLAP", get("CHUNK_OVERLAP"), defaults.chunk_overlap)?)
            .top_k(parse_or("TOP_K", get("TOP_K"), defaults.top_k)?)
            .similarity_threshold(parse_or(
                "SIMILARITY_THRESHOLD",
                get("SIMILARITY_THRESHOLD"),
                defaults.similarity_threshold,
            )?)
            .metadata_collection(string("METADATA_COLLECTION", DEFAULT_METADATA_COLLECTION))
            .default_temperature(parse_or(
                "DEFAULT_TEMPERATURE",
                get("DEFAULT_TEMPERATURE"),
                defaults.default_temperature,
            )?)
            .default_max_tokens(parse_or(
                "DEFAULT_MAX_TOKENS",
                get("DEFAULT_MAX_TOKENS"),
                defaults.default_max_tokens,
            )?)
            .build()?;

        Ok(Self {
            host: string("DOCQA_HOST", DEFAULT_HOST),
            port,
            qdrant_url: string("QDRANT_URL", qdrant::DEFAULT_URL),
            ollama_host: string("OLLAMA_HOST", ollama::DEFAULT_HOST),
            embedding_model: string("EMBEDDING_MODEL", ollama::DEFAULT_EMBEDDING_MODEL),
            embedding_dimensions: parse_or(
                "EMBEDDING_DIMENSIONS",
                get("EMBEDDING_DIMENSIONS"),
                ollama::DEFAULT_DIMENSIONS,
            )?,
            llm_model: string("LLM_MODEL", ollama::DEFAULT_GENERATION_MODEL),
            rag,
            scratch_dir: get("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("docqa")),
            max_upload_bytes: parse_or(
                "MAX_UPLOAD_BYTES",
                get("MAX_UPLOAD_BYTES"),
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            log_format: parse_or("DOCQA_LOG_FORMAT", get("DOCQA_LOG_FORMAT"), LogFormat::Text)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_value<T>(key: &'static str, value: String) -> Result<T, SettingsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| SettingsError::Invalid { key, value, reason: e.to_string() })
}

fn parse_or<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, SettingsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.map_or(Ok(default), |v| parse_value(key, v))
}
