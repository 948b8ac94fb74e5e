//! Fixed collection schemas.
//!
//! Every chunk collection shares [`CollectionSchema::chunks`]; the metadata index uses
//! [`CollectionSchema::metadata`]. Schemas are versionless: once a collection exists its
//! schema is never altered, and asking for a different one is a [`RagError::Schema`].
//!
//! [`RagError::Schema`]: crate::error::RagError::Schema

use serde::{Deserialize, Serialize};

/// Payload field names used by chunk and metadata rows.
pub mod fields {
    pub const TEXT: &str = "text";
    pub const SOURCE: &str = "source";
    pub const PAGE: &str = "page";
    pub const DOCUMENT_TYPE: &str = "document_type";
    pub const INDEX_ID: &str = "index_id";
    pub const FILENAME: &str = "filename";
    pub const UPLOAD_ID: &str = "upload_id";
    pub const COLLECTION_NAME: &str = "collection_name";
    pub const UPLOAD_DATE: &str = "upload_date";
}

/// The type of a scalar payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text; stored but not used in filters.
    Text,
    /// Exact-match string; indexed for filtering.
    Keyword,
    /// Integer; indexed for filtering.
    Integer,
}

/// One scalar field of a collection schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
}

impl SchemaField {
    fn new(name: &str, kind: FieldKind) -> Self {
        Self { name: name.to_string(), kind }
    }
}

/// Scalar fields plus an optional vector field of fixed dimensionality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Scalar payload fields.
    pub fields: Vec<SchemaField>,
    /// Vector dimensionality, or `None` for collections without similarity search.
    pub dimensions: Option<usize>,
}

impl CollectionSchema {
    /// Schema of a document chunk collection.
    pub fn chunks(dimensions: usize) -> Self {
        Self {
            fields: vec![
                SchemaField::new(fields::TEXT, FieldKind::Text),
                SchemaField::new(fields::SOURCE, FieldKind::Keyword),
                SchemaField::new(fields::PAGE, FieldKind::Integer),
                SchemaField::new(fields::DOCUMENT_TYPE, FieldKind::Keyword),
                SchemaField::new(fields::INDEX_ID, FieldKind::Keyword),
                SchemaField::new(fields::FILENAME, FieldKind::Keyword),
                SchemaField::new(fields::UPLOAD_ID, FieldKind::Keyword),
            ],
            dimensions: Some(dimensions),
        }
    }

    /// Schema of the metadata index collection. It has no vector field.
    pub fn metadata() -> Self {
        Self {
            fields: vec![
                SchemaField::new(fields::COLLECTION_NAME, FieldKind::Keyword),
                SchemaField::new(fields::DOCUMENT_TYPE, FieldKind::Keyword),
                SchemaField::new(fields::INDEX_ID, FieldKind::Keyword),
                SchemaField::new(fields::FILENAME, FieldKind::Keyword),
                SchemaField::new(fields::UPLOAD_DATE, FieldKind::Text),
            ],
            dimensions: None,
        }
    }

    /// Fields that backends should index for filtering.
    pub fn filterable_fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter().filter(|f| f.kind != FieldKind::Text)
    }
}
