//! Data types for pages, chunks, search results and metadata records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RagError, Result};
use crate::filter::{Payload, payload_str};
use crate::schema::fields;

/// One page of text extracted from an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// The extracted text.
    pub text: String,
    /// Zero-based page index within the source file.
    pub page: u32,
}

/// The (collection, document type, index id) triple an upload or question belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub collection_name: String,
    pub document_type: String,
    pub index_id: String,
}

impl Scope {
    pub fn new(
        collection_name: impl Into<String>,
        document_type: impl Into<String>,
        index_id: impl Into<String>,
    ) -> Self {
        Self {
            collection_name: collection_name.into(),
            document_type: document_type.into(),
            index_id: index_id.into(),
        }
    }

    /// Reject blank components.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] naming the first blank field.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("collection_name", &self.collection_name),
            ("document_type", &self.document_type),
            ("index_id", &self.index_id),
        ] {
            if value.trim().is_empty() {
                return Err(RagError::InvalidInput(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}

/// A span of extracted text with its scope tags and embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// The file the text was extracted from.
    pub source: String,
    /// Zero-based page index within `source`.
    pub page: u32,
    pub document_type: String,
    pub index_id: String,
    /// Name of the upload that produced this chunk.
    pub filename: String,
    /// The vector embedding for this chunk's text. Empty until embedded, and not
    /// returned by searches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Build the stored payload. `upload_id` ties the row to one ingestion run.
    pub fn to_payload(&self, upload_id: &str) -> Payload {
        let mut payload = Payload::new();
        payload.insert(fields::TEXT.into(), Value::String(self.text.clone()));
        payload.insert(fields::SOURCE.into(), Value::String(self.source.clone()));
        payload.insert(fields::PAGE.into(), Value::from(self.page));
        payload.insert(fields::DOCUMENT_TYPE.into(), Value::String(self.document_type.clone()));
        payload.insert(fields::INDEX_ID.into(), Value::String(self.index_id.clone()));
        payload.insert(fields::FILENAME.into(), Value::String(self.filename.clone()));
        payload.insert(fields::UPLOAD_ID.into(), Value::String(upload_id.to_string()));
        payload
    }

    /// Rebuild a chunk from a stored payload. Returns `None` if `text` is missing.
    pub fn from_payload(payload: &Payload) -> Option<Self> {
        let text = payload_str(payload, fields::TEXT)?.to_string();
        let owned = |field| payload_str(payload, field).unwrap_or_default().to_string();
        let page = payload.get(fields::PAGE).and_then(Value::as_u64).unwrap_or_default();
        Some(Self {
            text,
            source: owned(fields::SOURCE),
            page: u32::try_from(page).unwrap_or(u32::MAX),
            document_type: owned(fields::DOCUMENT_TYPE),
            index_id: owned(fields::INDEX_ID),
            filename: owned(fields::FILENAME),
            embedding: Vec::new(),
        })
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Provenance of one retrieved chunk, reported alongside an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub filename: String,
    /// Zero-based page index within `filename`.
    pub page: u32,
    pub document_type: String,
    pub index_id: String,
    pub score: f32,
}

impl From<&SearchResult> for Source {
    fn from(result: &SearchResult) -> Self {
        let chunk = &result.chunk;
        Self {
            filename: chunk.filename.clone(),
            page: chunk.page,
            document_type: chunk.document_type.clone(),
            index_id: chunk.index_id.clone(),
            score: result.score,
        }
    }
}

/// A stored row returned by a vector search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPayload {
    pub payload: Payload,
    pub score: f32,
}

/// One completed ingestion of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub collection_name: String,
    pub document_type: String,
    pub index_id: String,
    pub filename: String,
    pub upload_date: DateTime<Utc>,
}

impl MetadataRecord {
    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert(fields::COLLECTION_NAME.into(), Value::String(self.collection_name.clone()));
        payload.insert(fields::DOCUMENT_TYPE.into(), Value::String(self.document_type.clone()));
        payload.insert(fields::INDEX_ID.into(), Value::String(self.index_id.clone()));
        payload.insert(fields::FILENAME.into(), Value::String(self.filename.clone()));
        payload.insert(fields::UPLOAD_DATE.into(), Value::String(self.upload_date.to_rfc3339()));
        payload
    }

    /// Rebuild a record from a stored payload. Returns `None` for malformed rows.
    pub fn from_payload(payload: &Payload) -> Option<Self> {
        let upload_date = DateTime::parse_from_rfc3339(payload_str(payload, fields::UPLOAD_DATE)?)
            .ok()?
            .with_timezone(&Utc);
        Some(Self {
            collection_name: payload_str(payload, fields::COLLECTION_NAME)?.to_string(),
            document_type: payload_str(payload, fields::DOCUMENT_TYPE)?.to_string(),
            index_id: payload_str(payload, fields::INDEX_ID)?.to_string(),
            filename: payload_str(payload, fields::FILENAME)?.to_string(),
            upload_date,
        })
    }
}

/// A file listed by the metadata index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    pub upload_date: DateTime<Utc>,
}
