use std::{convert::Infallible, net::SocketAddr, time::Duration};

use anyhow::Context;
use async_stream::stream;
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Query, State,
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
    },
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use docqa_rag::{FileEntry, Increment, QueryRequest, Scope, Upload};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::{
    config::Settings,
    error::ApiError,
    state::{AppState, Backends},
};

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/health", get(health))
        .route("/documents/upload", post(upload_document))
        .route("/documents/files", get(document_files))
        .route("/query", post(query))
        .route("/metadata/collections", get(list_collections))
        .route("/metadata/index_ids", get(list_index_ids))
        .route("/metadata/document_types", get(list_document_types))
        .route("/metadata/files", get(list_files))
        .with_state(state)
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Open the backends, serve until ctrl-c or SIGTERM, then close the store.
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let backends = Backends::from_settings(&settings).context("failed to open backends")?;
    let state = AppState::new(
        backends,
        settings.rag.clone(),
        settings.scratch_dir.clone(),
        settings.max_upload_bytes,
    )
    .await
    .context("failed to prepare metadata collection")?;
    let store = state.store.clone();

    let addr: SocketAddr = settings
        .bind_addr()
        .parse()
        .with_context(|| format!("invalid host/port for docqa server: {}", settings.bind_addr()))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("docqa listening on http://{}", addr);

    axum::serve(listener, app_router(state)).with_graceful_shutdown(shutdown_signal()).await?;

    store.close().await.context("failed to close vector store")?;
    info!("docqa stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub chunk_count: usize,
}

async fn upload_document(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut upload = None;
    let (mut collection_name, mut document_type, mut index_id) = (None, None, None);

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("file field has no filename".into()))?;
                let bytes = field.bytes().await?;
                upload = Some(Upload::new(filename, bytes.to_vec()));
            }
            "collection_name" => collection_name = Some(field.text().await?),
            "document_type" => document_type = Some(field.text().await?),
            "index_id" => index_id = Some(field.text().await?),
            other => debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    let upload = upload.ok_or_else(|| missing("file"))?;
    let scope = Scope::new(
        collection_name.ok_or_else(|| missing("collection_name"))?,
        document_type.ok_or_else(|| missing("document_type"))?,
        index_id.ok_or_else(|| missing("index_id"))?,
    );

    let report = state.ingestion.ingest(&scope, upload).await?;
    Ok(Json(UploadResponse {
        message: report.message(),
        filename: report.filename,
        chunk_count: report.chunk_count,
    }))
}

fn missing(field: &str) -> ApiError {
    ApiError::BadRequest(format!("missing field: {field}"))
}

/// Stream an answer as server-sent events: one `sources` event listing the
/// retrieved chunks, then `message` events carrying text, and on failure a
/// final `error` event carrying `[ERROR] <message>`.
async fn query(
    State(state): State<AppState>,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = request?;
    let mut answer = state.query.answer(request).await?;
    let sources = Event::default()
        .event("sources")
        .json_data(&answer.sources)
        .map_err(|e| ApiError::Internal(format!("failed to encode sources: {e}")))?;

    let stream = stream! {
        yield Ok(sources);
        while let Some(increment) = answer.next().await {
            let event = match &increment {
                Increment::Text(text) => Event::default().event("message").data(text),
                Increment::Error(_) => Event::default().event("error").data(increment.to_marker_text()),
            };
            yield Ok(event);
        }
    };

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive")))
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    collection_name: String,
}

async fn list_collections(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let names = state.metadata.list_collections().await?;
    Ok(Json(names.into_iter().collect()))
}

async fn list_index_ids(
    State(state): State<AppState>,
    params: Result<Query<CollectionParams>, QueryRejection>,
) -> Result<Json<Vec<String>>, ApiError> {
    let Query(params) = params?;
    let ids = state.metadata.list_index_ids(&params.collection_name).await?;
    Ok(Json(ids.into_iter().collect()))
}

async fn list_document_types(
    State(state): State<AppState>,
    params: Result<Query<CollectionParams>, QueryRejection>,
) -> Result<Json<Vec<String>>, ApiError> {
    let Query(params) = params?;
    let types = state.metadata.list_document_types(&params.collection_name).await?;
    Ok(Json(types.into_iter().collect()))
}

async fn list_files(
    State(state): State<AppState>,
    scope: Result<Query<Scope>, QueryRejection>,
) -> Result<Json<Vec<FileEntry>>, ApiError> {
    let Query(scope) = scope?;
    Ok(Json(state.metadata.list_files(&scope).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<FileEntry>,
}

async fn document_files(
    State(state): State<AppState>,
    scope: Result<Query<Scope>, QueryRejection>,
) -> Result<Json<FilesResponse>, ApiError> {
    let Query(scope) = scope?;
    let files = state.metadata.list_files(&scope).await?;
    Ok(Json(FilesResponse { files }))
}
