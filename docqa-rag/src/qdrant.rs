//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! Collections without a vector field (the metadata index) are stored with a
//! one-dimensional placeholder vector, since Qdrant points always carry one.
//! Filterable schema fields get payload indexes when a collection is created.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::connect("http://localhost:6334")?;
//! store.ensure_collection("docs", &CollectionSchema::chunks(768)).await?;
//! let hits = store.search("docs", &query_embedding, &filter, 5).await?;
//! ```

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter as QdrantFilter, PointStruct, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload as QdrantPayload, Qdrant, QdrantError};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::document::ScoredPayload;
use crate::error::{RagError, Result};
use crate::filter::{Filter, MatchValue, Payload};
use crate::schema::{CollectionSchema, FieldKind};
use crate::vectorstore::{VectorStore, project};

const BACKEND: &str = "qdrant";

/// Default gRPC endpoint of a local Qdrant.
pub const DEFAULT_URL: &str = "http://localhost:6334";

const PLACEHOLDER_VECTOR: [f32; 1] = [1.0];

const SCROLL_PAGE_SIZE: u32 = 256;

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// Wraps a [`qdrant_client::Qdrant`] client. Vector collections use cosine
/// distance; rows are stored as Qdrant payload under random UUID point ids.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Open a client for the Qdrant server at `url`.
    pub fn connect(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(connection_error)?;
        info!(url, "connected to qdrant");
        Ok(Self { client })
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    /// Vector size and already indexed payload fields of an existing collection.
    async fn layout(&self, name: &str) -> Result<(Option<u64>, HashSet<String>)> {
        let info = self.client.collection_info(name).await.map_err(connection_error)?;
        let Some(result) = info.result else {
            return Ok((None, HashSet::new()));
        };
        let size = result
            .config
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|config| match config {
                VectorsConfigKind::Params(params) => Some(params.size),
                VectorsConfigKind::ParamsMap(_) => None,
            });
        Ok((size, result.payload_schema.into_keys().collect()))
    }
}

/// Reject an existing collection whose vector size differs from the schema.
fn check_vector_size(collection: &str, existing: Option<u64>, expected: u64) -> Result<()> {
    match existing {
        Some(size) if size != expected => Err(schema_error(
            collection,
            format!("existing vector size {size} does not match {expected}"),
        )),
        _ => Ok(()),
    }
}

/// Filterable schema fields that have no payload index yet.
fn missing_indexes<'a>(
    schema: &'a CollectionSchema,
    indexed: &HashSet<String>,
) -> Vec<(&'a str, FieldType)> {
    schema
        .filterable_fields()
        .filter(|field| !indexed.contains(&field.name))
        .map(|field| {
            let field_type = match field.kind {
                FieldKind::Integer => FieldType::Integer,
                FieldKind::Keyword | FieldKind::Text => FieldType::Keyword,
            };
            (field.name.as_str(), field_type)
        })
        .collect()
}

fn connection_error(e: QdrantError) -> RagError {
    RagError::StoreConnection { backend: BACKEND.to_string(), message: e.to_string() }
}

fn write_error(e: impl std::fmt::Display) -> RagError {
    RagError::StoreWrite { backend: BACKEND.to_string(), message: e.to_string() }
}

fn schema_error(collection: &str, e: impl std::fmt::Display) -> RagError {
    RagError::Schema { collection: collection.to_string(), message: e.to_string() }
}

/// Translate a [`Filter`] into a Qdrant `must` filter.
fn to_qdrant_filter(filter: &Filter) -> QdrantFilter {
    QdrantFilter::must(filter.conditions().iter().map(|m| match &m.value {
        MatchValue::Keyword(s) => Condition::matches(m.field.as_str(), s.clone()),
        MatchValue::Integer(i) => Condition::matches(m.field.as_str(), *i),
    }))
}

/// Convert a Qdrant payload value back into JSON.
fn to_json(value: &QdrantValue) -> Value {
    match &value.kind {
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::IntegerValue(i)) => Value::from(*i),
        Some(Kind::DoubleValue(d)) => Value::from(*d),
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::ListValue(list)) => Value::Array(list.values.iter().map(to_json).collect()),
        Some(Kind::StructValue(s)) => {
            Value::Object(s.fields.iter().map(|(k, v)| (k.clone(), to_json(v))).collect())
        }
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}

fn to_payload(map: &HashMap<String, QdrantValue>) -> Payload {
    map.iter().map(|(k, v)| (k.clone(), to_json(v))).collect()
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn ensure_collection(&self, name: &str, schema: &CollectionSchema) -> Result<()> {
        let expected = schema.dimensions.unwrap_or(PLACEHOLDER_VECTOR.len()) as u64;

        if !self.client.collection_exists(name).await.map_err(connection_error)? {
            let distance = if schema.dimensions.is_some() { Distance::Cosine } else { Distance::Dot };
            let created = self
                .client
                .create_collection(
                    CreateCollectionBuilder::new(name)
                        .vectors_config(VectorParamsBuilder::new(expected, distance)),
                )
                .await;
            match created {
                Ok(_) => info!(collection = name, dimensions = expected, "created qdrant collection"),
                // Another writer may have created it since the existence check.
                Err(e) => {
                    if !self.client.collection_exists(name).await.map_err(connection_error)? {
                        return Err(schema_error(name, e));
                    }
                    debug!(collection = name, "qdrant collection created concurrently");
                }
            }
        }

        let (size, indexed) = self.layout(name).await?;
        check_vector_size(name, size, expected)?;

        for (field, field_type) in missing_indexes(schema, &indexed) {
            self.client
                .create_field_index(
                    CreateFieldIndexCollectionBuilder::new(name, field, field_type).wait(true),
                )
                .await
                .map_err(|e| schema_error(name, e))?;
            debug!(collection = name, field, "created qdrant payload index");
        }
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        self.client.collection_exists(name).await.map_err(connection_error)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self.client.list_collections().await.map_err(connection_error)?;
        Ok(response.collections.into_iter().map(|c| c.name).collect())
    }

    async fn insert(
        &self,
        collection: &str,
        payload: Payload,
        vector: Option<Vec<f32>>,
    ) -> Result<()> {
        let payload = QdrantPayload::try_from(Value::Object(payload)).map_err(write_error)?;
        let vector = vector.unwrap_or_else(|| PLACEHOLDER_VECTOR.to_vec());
        let point = PointStruct::new(Uuid::new_v4().to_string(), vector, payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, vec![point]).wait(true))
            .await
            .map_err(write_error)?;

        debug!(collection, "inserted point into qdrant");
        Ok(())
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection).points(to_qdrant_filter(filter)).wait(true),
            )
            .await
            .map_err(write_error)?;

        debug!(collection, conditions = filter.conditions().len(), "deleted points from qdrant");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &Filter,
        top_k: usize,
    ) -> Result<Vec<ScoredPayload>> {
        let mut request = SearchPointsBuilder::new(collection, vector.to_vec(), top_k as u64)
            .with_payload(true);
        if !filter.is_empty() {
            request = request.filter(to_qdrant_filter(filter));
        }

        let response = self.client.search_points(request).await.map_err(connection_error)?;

        debug!(collection, hits = response.result.len(), "qdrant search complete");
        Ok(response
            .result
            .iter()
            .map(|scored| ScoredPayload { payload: to_payload(&scored.payload), score: scored.score })
            .collect())
    }

    async fn fetch(
        &self,
        collection: &str,
        filter: &Filter,
        fields: &[&str],
    ) -> Result<Vec<Payload>> {
        let mut rows = Vec::new();
        let mut offset = None;

        loop {
            let mut request =
                ScrollPointsBuilder::new(collection).with_payload(true).limit(SCROLL_PAGE_SIZE);
            if !filter.is_empty() {
                request = request.filter(to_qdrant_filter(filter));
            }
            if let Some(point_id) = offset.take() {
                request = request.offset(point_id);
            }

            let page = self.client.scroll(request).await.map_err(connection_error)?;
            rows.extend(page.result.iter().map(|point| project(&to_payload(&point.payload), fields)));

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        debug!(collection, rows = rows.len(), "qdrant scroll complete");
        Ok(rows)
    }

    async fn close(&self) -> Result<()> {
        // The gRPC channel closes when the client is dropped.
        info!("closing qdrant connection");
        Ok(())
    }
}
