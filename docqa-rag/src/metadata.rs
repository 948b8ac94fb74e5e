//! Discovery index over completed uploads.
//!
//! The [`MetadataIndex`] keeps one [`MetadataRecord`] per ingested file in a
//! dedicated collection without vectors, so listing what exists never scans
//! chunk collections.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::document::{FileEntry, MetadataRecord, Scope};
use crate::error::Result;
use crate::filter::{Filter, payload_str};
use crate::schema::{CollectionSchema, fields};
use crate::vectorstore::VectorStore;

/// Records uploads and answers discovery queries.
///
/// Every call goes to the store; nothing is cached between calls.
pub struct MetadataIndex {
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl MetadataIndex {
    /// Create an index over `collection`. Call [`init`](Self::init) before use.
    pub fn new(store: Arc<dyn VectorStore>, collection: impl Into<String>) -> Self {
        Self { store, collection: collection.into() }
    }

    /// The name of the backing collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the backing collection if it does not exist.
    pub async fn init(&self) -> Result<()> {
        self.store.ensure_collection(&self.collection, &CollectionSchema::metadata()).await
    }

    /// Record one completed upload. Always inserts; repeated uploads of the
    /// same filename produce repeated records.
    pub async fn record_upload(&self, scope: &Scope, filename: &str) -> Result<MetadataRecord> {
        let record = MetadataRecord {
            collection_name: scope.collection_name.clone(),
            document_type: scope.document_type.clone(),
            index_id: scope.index_id.clone(),
            filename: filename.to_string(),
            upload_date: Utc::now(),
        };
        self.store.insert(&self.collection, record.to_payload(), None).await?;
        info!(
            collection = %record.collection_name,
            document_type = %record.document_type,
            index_id = %record.index_id,
            filename,
            "recorded upload"
        );
        Ok(record)
    }

    /// Every collection in the store except the metadata collection itself.
    pub async fn list_collections(&self) -> Result<BTreeSet<String>> {
        let names = self.store.list_collections().await?;
        Ok(names.into_iter().filter(|name| *name != self.collection).collect())
    }

    /// Distinct `index_id` values recorded for `collection_name`.
    pub async fn list_index_ids(&self, collection_name: &str) -> Result<BTreeSet<String>> {
        self.distinct(collection_name, fields::INDEX_ID).await
    }

    /// Distinct `document_type` values recorded for `collection_name`.
    pub async fn list_document_types(&self, collection_name: &str) -> Result<BTreeSet<String>> {
        self.distinct(collection_name, fields::DOCUMENT_TYPE).await
    }

    /// Files recorded for the exact (collection, document type, index id) triple,
    /// oldest first.
    pub async fn list_files(&self, scope: &Scope) -> Result<Vec<FileEntry>> {
        let filter = Filter::eq(fields::COLLECTION_NAME, scope.collection_name.as_str())
            .and_eq(fields::DOCUMENT_TYPE, scope.document_type.as_str())
            .and_eq(fields::INDEX_ID, scope.index_id.as_str());
        let rows = self.store.fetch(&self.collection, &filter, &[]).await?;

        let mut files: Vec<FileEntry> = rows
            .iter()
            .filter_map(MetadataRecord::from_payload)
            .map(|r| FileEntry { filename: r.filename, upload_date: r.upload_date })
            .collect();
        files.sort_by(|a, b| {
            a.upload_date.cmp(&b.upload_date).then_with(|| a.filename.cmp(&b.filename))
        });
        debug!(collection = %scope.collection_name, file_count = files.len(), "listed files");
        Ok(files)
    }

    async fn distinct(&self, collection_name: &str, field: &str) -> Result<BTreeSet<String>> {
        let filter = Filter::eq(fields::COLLECTION_NAME, collection_name);
        let rows = self.store.fetch(&self.collection, &filter, &[field]).await?;
        Ok(rows.iter().filter_map(|row| payload_str(row, field)).map(str::to_string).collect())
    }
}
