//! Streaming query pipeline behaviour with scripted generation.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{DIM, FailingEmbedder, HistogramEmbedder, ScriptedGenerator};
use docqa_rag::config::DEFAULT_METADATA_COLLECTION;
use docqa_rag::schema::CollectionSchema;
use docqa_rag::{
    Chunk, EmbeddingProvider, GenerationOptions, GenerationProvider, Increment,
    InMemoryVectorStore, QueryPipeline, QueryRequest, RagConfig, RagError, Scope, ScopedRetriever,
    TextStream, VectorStore,
};
use futures::StreamExt;

fn chunk(text: &str, index_id: &str) -> Chunk {
    Chunk {
        text: text.to_string(),
        source: format!("{index_id}.pdf"),
        page: 0,
        document_type: "service".to_string(),
        index_id: index_id.to_string(),
        filename: format!("{index_id}.pdf"),
        embedding: Vec::new(),
    }
}

async fn seeded_store() -> Arc<InMemoryVectorStore> {
    let store = Arc::new(InMemoryVectorStore::new());
    store.ensure_collection("manuals", &CollectionSchema::chunks(DIM)).await.unwrap();
    for (text, index_id) in [
        ("Pump A runs at 40 bar.", "a"),
        ("Pump A seals are rubber.", "a"),
        ("Pump B runs at 90 bar.", "b"),
    ] {
        let vector = HistogramEmbedder::vector(text);
        store
            .insert("manuals", chunk(text, index_id).to_payload("seed"), Some(vector))
            .await
            .unwrap();
    }
    store
}

fn pipeline(
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
) -> QueryPipeline {
    QueryPipeline::new(RagConfig::default(), ScopedRetriever::new(store, embedder), generator)
}

fn request(index_id: &str) -> QueryRequest {
    QueryRequest {
        question: "How much pressure?".to_string(),
        scope: Scope::new("manuals", "service", index_id),
        temperature: None,
        max_tokens: None,
    }
}

#[tokio::test]
async fn increments_are_forwarded_in_order() {
    let generator = Arc::new(ScriptedGenerator::new(&["The", " answer", " is", " 42."]));
    let qp = pipeline(seeded_store().await, Arc::new(HistogramEmbedder::default()), generator);

    let increments: Vec<Increment> = qp.answer(request("a")).await.unwrap().collect().await;

    assert_eq!(
        increments,
        ["The", " answer", " is", " 42."].map(|t| Increment::Text(t.to_string())).to_vec()
    );
}

#[tokio::test]
async fn mid_stream_failure_ends_with_one_error() {
    let generator = Arc::new(ScriptedGenerator::failing_after(&["Partial"], "model crashed"));
    let qp = pipeline(seeded_store().await, Arc::new(HistogramEmbedder::default()), generator);

    let increments: Vec<Increment> = qp.answer(request("a")).await.unwrap().collect().await;

    assert_eq!(increments.len(), 2);
    assert_eq!(increments[0], Increment::Text("Partial".to_string()));
    assert!(increments[1].is_error());
    assert_eq!(
        increments[1].to_marker_text(),
        "[ERROR] Generation error (scripted): model crashed"
    );
}

#[tokio::test]
async fn missing_collection_never_calls_generation() {
    let generator = Arc::new(ScriptedGenerator::new(&["unused"]));
    let qp = pipeline(
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(HistogramEmbedder::default()),
        generator.clone(),
    );

    let err = qp.answer(request("a")).await.err().unwrap();

    assert!(matches!(err, RagError::CollectionNotFound(ref name) if name == "manuals"));
    assert_eq!(err.to_string(), "Collection not found: manuals");
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn context_comes_only_from_the_requested_index() {
    let generator = Arc::new(ScriptedGenerator::new(&["ok"]));
    let qp =
        pipeline(seeded_store().await, Arc::new(HistogramEmbedder::default()), generator.clone());

    let _: Vec<Increment> = qp.answer(request("a")).await.unwrap().collect().await;

    let prompt = generator.last_prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.contains("Pump A runs at 40 bar."));
    assert!(prompt.contains("Pump A seals are rubber."));
    assert!(!prompt.contains("Pump B"));
    assert!(prompt.ends_with("Question: How much pressure?"));
}

#[tokio::test]
async fn unmatched_scope_still_answers_with_empty_context() {
    let generator = Arc::new(ScriptedGenerator::new(&["I don't know."]));
    let qp =
        pipeline(seeded_store().await, Arc::new(HistogramEmbedder::default()), generator.clone());

    let increments: Vec<Increment> = qp.answer(request("zzz")).await.unwrap().collect().await;

    assert_eq!(increments, vec![Increment::Text("I don't know.".to_string())]);
    let prompt = generator.last_prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.contains("<context>\n\n</context>"));
}

#[tokio::test]
async fn retrieval_failure_is_reported_in_band() {
    let generator = Arc::new(ScriptedGenerator::new(&["unused"]));
    let qp = pipeline(seeded_store().await, Arc::new(FailingEmbedder), generator.clone());

    let increments: Vec<Increment> = qp.answer(request("a")).await.unwrap().collect().await;

    assert_eq!(increments.len(), 1);
    assert!(increments[0].to_marker_text().starts_with("[ERROR] Embedding error"));
    assert_eq!(generator.call_count(), 0);

    let answer = qp.answer(request("a")).await.unwrap();
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn sampling_options_default_from_config() {
    let generator = Arc::new(ScriptedGenerator::new(&["ok"]));
    let qp =
        pipeline(seeded_store().await, Arc::new(HistogramEmbedder::default()), generator.clone());

    let _: Vec<Increment> = qp.answer(request("a")).await.unwrap().collect().await;
    assert_eq!(
        *generator.last_options.lock().unwrap(),
        Some(GenerationOptions { temperature: 0.7, max_tokens: 4096 })
    );

    let overridden = QueryRequest { temperature: Some(0.0), max_tokens: Some(32), ..request("a") };
    let _: Vec<Increment> = qp.answer(overridden).await.unwrap().collect().await;
    assert_eq!(
        *generator.last_options.lock().unwrap(),
        Some(GenerationOptions { temperature: 0.0, max_tokens: 32 })
    );
}

#[tokio::test]
async fn blank_question_is_rejected() {
    let generator = Arc::new(ScriptedGenerator::new(&["unused"]));
    let qp = pipeline(seeded_store().await, Arc::new(HistogramEmbedder::default()), generator);

    let blank = QueryRequest { question: "  ".to_string(), ..request("a") };
    assert!(matches!(qp.answer(blank).await.err(), Some(RagError::InvalidInput(_))));
}

#[tokio::test]
async fn similarity_threshold_drops_weak_hits() {
    let store = seeded_store().await;
    let retriever = ScopedRetriever::new(store, Arc::new(HistogramEmbedder::default()))
        .with_similarity_threshold(1.01);

    let hits = retriever.retrieve(&Scope::new("manuals", "service", "a"), "pump", 10).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn sources_describe_the_retrieved_chunks() {
    let generator = Arc::new(ScriptedGenerator::new(&["ok"]));
    let qp = pipeline(seeded_store().await, Arc::new(HistogramEmbedder::default()), generator);

    let answer = qp.answer(request("a")).await.unwrap();

    assert_eq!(answer.sources.len(), 2);
    for source in &answer.sources {
        assert_eq!(source.filename, "a.pdf");
        assert_eq!(source.page, 0);
        assert_eq!(source.document_type, "service");
        assert_eq!(source.index_id, "a");
    }
    assert!(answer.sources[0].score >= answer.sources[1].score);

    let increments: Vec<Increment> = answer.collect().await;
    assert_eq!(increments, vec![Increment::Text("ok".to_string())]);
}

#[tokio::test]
async fn metadata_collection_is_not_queryable() {
    let store = seeded_store().await;
    store.ensure_collection(DEFAULT_METADATA_COLLECTION, &CollectionSchema::metadata()).await.unwrap();
    let generator = Arc::new(ScriptedGenerator::new(&["unused"]));
    let qp = pipeline(store, Arc::new(HistogramEmbedder::default()), generator.clone());

    let metadata = QueryRequest {
        scope: Scope::new(DEFAULT_METADATA_COLLECTION, "service", "a"),
        ..request("a")
    };
    let err = qp.answer(metadata).await.err().unwrap();

    assert!(matches!(err, RagError::CollectionNotFound(ref name) if name == DEFAULT_METADATA_COLLECTION));
    assert_eq!(generator.call_count(), 0);
}

/// Sets its flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Generates words forever, counting how often it is pulled.
#[derive(Default)]
struct EndlessGenerator {
    pulls: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

#[async_trait]
impl GenerationProvider for EndlessGenerator {
    fn name(&self) -> &str {
        "endless"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _options: GenerationOptions,
    ) -> docqa_rag::Result<TextStream> {
        let pulls = Arc::clone(&self.pulls);
        let guard = DropFlag(Arc::clone(&self.released));
        Ok(Box::pin(futures::stream::unfold((0usize, guard), move |(n, guard)| {
            let pulls = Arc::clone(&pulls);
            async move {
                pulls.fetch_add(1, Ordering::SeqCst);
                Some((Ok(format!("word{n} ")), (n + 1, guard)))
            }
        })))
    }
}

#[tokio::test]
async fn dropping_the_answer_stops_and_releases_generation() {
    let generator = Arc::new(EndlessGenerator::default());
    let qp =
        pipeline(seeded_store().await, Arc::new(HistogramEmbedder::default()), generator.clone());

    let mut answer = qp.answer(request("a")).await.unwrap();
    assert_eq!(answer.next().await, Some(Increment::Text("word0 ".to_string())));
    assert_eq!(answer.next().await, Some(Increment::Text("word1 ".to_string())));

    let pulled = generator.pulls.load(Ordering::SeqCst);
    assert_eq!(pulled, 2);
    assert!(!generator.released.load(Ordering::SeqCst));

    drop(answer);
    tokio::task::yield_now().await;

    assert!(generator.released.load(Ordering::SeqCst));
    assert_eq!(generator.pulls.load(Ordering::SeqCst), pulled);
}
