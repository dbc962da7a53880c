//! End-to-end tests for the ingestion → retrieval pipeline, driven against a
//! mocked Ollama embedding endpoint and a real on-disk store in a temp dir.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sage::config::{EmbeddingSettings, RetrievalSettings, StoreSettings};
use sage::embedding::{EmbeddingClient, Sleeper};
use sage::ingest::{BatchPolicy, Checkpoint, IngestionPipeline};
use sage::rag::{ContextBuilder, RetrievalOutcome, TextChunker};
use sage::store::KnowledgeStore;
use sage::types::FailureReason;

const DIMS: usize = 8;

struct NoopSleeper;

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

/// Mock embedding endpoint that returns the same unit vector for everything,
/// so any stored chunk matches any query with cosine score 1.0.
async fn mock_embedding_server() -> MockServer {
    let server = MockServer::start().await;
    let vector: Vec<f32> = (0..DIMS).map(|i| if i == 0 { 1.0 } else { 0.0 }).collect();
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embedding": vector })))
        .mount(&server)
        .await;
    server
}

fn embedding_settings(base_url: &str) -> EmbeddingSettings {
    EmbeddingSettings {
        base_url: base_url.to_string(),
        dimensions: DIMS,
        max_attempts: 2,
        base_timeout_secs: 5,
        max_jitter: 0.0,
        ..Default::default()
    }
}

fn store_settings(dir: &Path) -> StoreSettings {
    StoreSettings {
        path: dir.join("vectors"),
        collection: "transcripts".to_string(),
    }
}

fn retrieval_settings() -> RetrievalSettings {
    RetrievalSettings {
        top_k: 3,
        score_threshold: 0.7,
        max_context_chars: 1500,
    }
}

async fn run_pipeline(
    corpus: &Path,
    store: &KnowledgeStore,
    embedder: &EmbeddingClient,
    checkpoint: Option<std::path::PathBuf>,
) -> sage::IngestReport {
    let chunker = TextChunker::new(300, 50).unwrap();
    let mut pipeline = IngestionPipeline::new(&chunker, embedder, store, BatchPolicy::unthrottled())
        .with_sleeper(Arc::new(NoopSleeper));
    if let Some(path) = checkpoint {
        pipeline = pipeline.with_checkpoint(path);
    }
    pipeline.run(corpus).await.unwrap()
}

#[tokio::test]
async fn ingest_then_query_round_trip() {
    let server = mock_embedding_server().await;
    let workspace = TempDir::new().unwrap();
    let corpus = workspace.path().join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    let file_path = corpus.join("greeting.txt");
    std::fs::write(&file_path, "Hello world, this is a test.").unwrap();

    let store = KnowledgeStore::open(&store_settings(workspace.path()), DIMS)
        .await
        .unwrap();
    let embedder = EmbeddingClient::new(&embedding_settings(&server.uri()));

    let report = run_pipeline(&corpus, &store, &embedder, None).await;
    assert_eq!(report.scanned, 1);
    assert_eq!(report.successful, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.chunks_stored, 1);

    let builder = ContextBuilder::new(&retrieval_settings()).with_score_threshold(0.0);
    let outcome = builder
        .answer_context(&embedder, &store, "What is this?")
        .await
        .unwrap();

    match outcome {
        RetrievalOutcome::Answer(context) => {
            assert!(context.context_text.contains("Hello world"));
            assert!(context.sources.contains("greeting.txt"));
        }
        RetrievalOutcome::NoMatch => panic!("expected an answer"),
    }
}

#[tokio::test]
async fn reingesting_unchanged_corpus_is_a_noop() {
    let server = mock_embedding_server().await;
    let workspace = TempDir::new().unwrap();
    let corpus = workspace.path().join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    std::fs::write(corpus.join("a.txt"), "some transcript content here").unwrap();

    let store = KnowledgeStore::open(&store_settings(workspace.path()), DIMS)
        .await
        .unwrap();
    let embedder = EmbeddingClient::new(&embedding_settings(&server.uri()));

    let first = run_pipeline(&corpus, &store, &embedder, None).await;
    assert_eq!(first.successful, 1);
    let count_after_first = store.count().await;

    let second = run_pipeline(&corpus, &store, &embedder, None).await;
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped_existing, 1);
    assert_eq!(store.count().await, count_after_first);
}

#[tokio::test]
async fn identical_content_in_two_files_stays_two_sources() {
    let server = mock_embedding_server().await;
    let workspace = TempDir::new().unwrap();
    let corpus = workspace.path().join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    std::fs::write(corpus.join("a.txt"), "identical transcript words").unwrap();
    std::fs::write(corpus.join("b.txt"), "identical transcript words").unwrap();

    let store = KnowledgeStore::open(&store_settings(workspace.path()), DIMS)
        .await
        .unwrap();
    let embedder = EmbeddingClient::new(&embedding_settings(&server.uri()));

    let report = run_pipeline(&corpus, &store, &embedder, None).await;
    assert_eq!(report.successful, 2);

    let sources = store.ingested_sources().await;
    assert_eq!(sources.len(), 2);
    assert!(sources.iter().any(|s| s.ends_with("a.txt")));
    assert!(sources.iter().any(|s| s.ends_with("b.txt")));
    // Source identity, not content identity, keys the points.
    assert_eq!(store.count().await, 2);
}

#[tokio::test]
async fn empty_file_is_skipped_with_reason() {
    let server = mock_embedding_server().await;
    let workspace = TempDir::new().unwrap();
    let corpus = workspace.path().join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    std::fs::write(corpus.join("blank.txt"), "   \n\n  ").unwrap();
    std::fs::write(corpus.join("real.txt"), "actual content").unwrap();

    let store = KnowledgeStore::open(&store_settings(workspace.path()), DIMS)
        .await
        .unwrap();
    let embedder = EmbeddingClient::new(&embedding_settings(&server.uri()));

    let report = run_pipeline(&corpus, &store, &embedder, None).await;

    assert_eq!(report.processed, 2);
    assert_eq!(report.successful, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.reasons.get(&FailureReason::EmptyFile), Some(&1));
}

#[tokio::test]
async fn embedding_outage_fails_files_but_finishes_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let workspace = TempDir::new().unwrap();
    let corpus = workspace.path().join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    std::fs::write(corpus.join("a.txt"), "content a").unwrap();
    std::fs::write(corpus.join("b.txt"), "content b").unwrap();

    let store = KnowledgeStore::open(&store_settings(workspace.path()), DIMS)
        .await
        .unwrap();
    let embedder = EmbeddingClient::new(&embedding_settings(&server.uri()))
        .with_sleeper(Arc::new(NoopSleeper));

    let report = run_pipeline(&corpus, &store, &embedder, None).await;

    // The batch always finishes with a summary, even when every item failed.
    assert_eq!(report.processed, 2);
    assert_eq!(report.successful, 0);
    assert_eq!(report.failed, 2);
    assert_eq!(
        report.reasons.get(&FailureReason::EmbeddingFailed),
        Some(&2)
    );
    assert_eq!(store.count().await, 0);
}

#[tokio::test]
async fn checkpoint_tracks_progress_and_is_overwritten() {
    let server = mock_embedding_server().await;
    let workspace = TempDir::new().unwrap();
    let corpus = workspace.path().join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    std::fs::write(corpus.join("a.txt"), "first file").unwrap();
    std::fs::write(corpus.join("b.txt"), "second file").unwrap();

    let checkpoint_path = workspace.path().join("checkpoint.json");
    let store = KnowledgeStore::open(&store_settings(workspace.path()), DIMS)
        .await
        .unwrap();
    let embedder = EmbeddingClient::new(&embedding_settings(&server.uri()));

    run_pipeline(&corpus, &store, &embedder, Some(checkpoint_path.clone())).await;

    let checkpoint = Checkpoint::read(&checkpoint_path).unwrap();
    assert_eq!(checkpoint.processed, 2);
    assert_eq!(checkpoint.total, 2);
    assert_eq!(checkpoint.successful, 2);
    assert_eq!(checkpoint.failed, 0);
    assert!(checkpoint.last_source.ends_with("b.txt"));
}

#[tokio::test]
async fn store_survives_reopen() {
    let server = mock_embedding_server().await;
    let workspace = TempDir::new().unwrap();
    let corpus = workspace.path().join("corpus");
    std::fs::create_dir_all(&corpus).unwrap();
    std::fs::write(corpus.join("a.txt"), "durable content").unwrap();

    let settings = store_settings(workspace.path());
    {
        let store = KnowledgeStore::open(&settings, DIMS).await.unwrap();
        let embedder = EmbeddingClient::new(&embedding_settings(&server.uri()));
        let report = run_pipeline(&corpus, &store, &embedder, None).await;
        assert_eq!(report.successful, 1);
    }

    let reopened = KnowledgeStore::open(&settings, DIMS).await.unwrap();
    assert_eq!(reopened.count().await, 1);
    let sources = reopened.ingested_sources().await;
    assert!(sources.iter().any(|s| s.ends_with("a.txt")));
}

#[tokio::test]
async fn missing_corpus_directory_aborts_the_run() {
    let server = mock_embedding_server().await;
    let workspace = TempDir::new().unwrap();

    let store = KnowledgeStore::open(&store_settings(workspace.path()), DIMS)
        .await
        .unwrap();
    let embedder = EmbeddingClient::new(&embedding_settings(&server.uri()));
    let chunker = TextChunker::new(300, 50).unwrap();
    let pipeline =
        IngestionPipeline::new(&chunker, &embedder, &store, BatchPolicy::unthrottled());

    let result = pipeline.run(&workspace.path().join("does-not-exist")).await;
    assert!(matches!(result, Err(sage::AppError::Configuration(_))));
}

#[tokio::test]
async fn query_below_threshold_reports_no_match_not_error() {
    let server = mock_embedding_server().await;
    let workspace = TempDir::new().unwrap();

    let store = KnowledgeStore::open(&store_settings(workspace.path()), DIMS)
        .await
        .unwrap();
    let embedder = EmbeddingClient::new(&embedding_settings(&server.uri()));

    // Nothing ingested: the store is empty, so nothing can meet the threshold.
    let builder = ContextBuilder::new(&retrieval_settings());
    let outcome = builder
        .answer_context(&embedder, &store, "anything at all")
        .await
        .unwrap();

    assert!(matches!(outcome, RetrievalOutcome::NoMatch));
}
