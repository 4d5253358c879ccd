//! End-to-end pipeline against an in-process fake of the OpenAI API.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use rag_testgen::config::{
    ChunkingConfig, Credentials, EmbeddingConfig, EmbeddingProviderKind, GenerationConfig,
    SchemaConfig, SchemaPolicy, SearchMode,
};
use rag_testgen::embedding::create_embedder;
use rag_testgen::error::Error;
use rag_testgen::feedback::TestReport;
use rag_testgen::fixtures;
use rag_testgen::ingest::Indexer;
use rag_testgen::llm::OpenAiChat;
use rag_testgen::orchestrator::{Artifacts, Orchestrator, RetrievedContext, UNIT_TESTS_FILE};
use rag_testgen::schema::{init_schema, CODE_COLLECTION, REQUIREMENTS_COLLECTION};
use rag_testgen::search::Retriever;
use rag_testgen::store::sqlite::SqliteStore;
use rag_testgen::store::VectorStore;

const API_KEY: &str = "sk-fake";

const TABLE: &str = "| ID | Test Case | Input | Expected Result |\n\
                     |----|-----------|-------|-----------------|\n\
                     | 1 | valid discount | (100, 10) | Ok(90.0) |\n\
                     | 2 | negative price | (-1, 10) | Err |";

const UNIT_TESTS: &str = "Here you go:\n\n```rust\n\
#[cfg(test)]\n\
mod tests {\n\
    use super::*;\n\
\n\
    #[test]\n\
    fn valid_discount() {\n\
        let price = calculate_discounted_price(100.0, 10.0).unwrap();\n\
        assert!((price - 90.0).abs() < 1e-9);\n\
    }\n\
\n\
    #[test]\n\
    fn negative_price() {\n\
        assert!(calculate_discounted_price(-1.0, 10.0).is_err());\n\
    }\n\
}\n\
```\n";

#[derive(Default)]
struct FakeOpenAi {
    chat_calls: AtomicUsize,
    embedding_calls: AtomicUsize,
    /// Number of initial chat calls answered with 503.
    chat_failures: usize,
    /// Answer every chat call with 400.
    reject_requests: bool,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", API_KEY))
}

/// Four features: mentions of discount, square, price, plus a constant.
fn fake_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    vec![
        lower.contains("discount") as u8 as f32,
        lower.contains("square") as u8 as f32,
        lower.contains("price") as u8 as f32,
        0.1,
    ]
}

async fn embeddings(
    State(state): State<Arc<FakeOpenAi>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }
    state.embedding_calls.fetch_add(1, Ordering::SeqCst);

    let inputs = body["input"].as_array().cloned().unwrap_or_default();
    // Answer in reverse order; clients must sort by index.
    let data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(i, text)| {
            json!({
                "object": "embedding",
                "index": i,
                "embedding": fake_vector(text.as_str().unwrap_or_default()),
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": data })).into_response()
}

async fn chat(
    State(state): State<Arc<FakeOpenAi>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let call = state.chat_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }
    if state.reject_requests {
        return (StatusCode::BAD_REQUEST, "context length exceeded").into_response();
    }
    if call < state.chat_failures {
        return (StatusCode::SERVICE_UNAVAILABLE, "overloaded").into_response();
    }

    let prompt = body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string();

    let reply = if prompt.starts_with("Generate a table in markdown") {
        TABLE.to_string()
    } else if prompt.starts_with("Generate unit tests") {
        UNIT_TESTS.to_string()
    } else if prompt.contains("Test report:") {
        "The discount is applied twice; use `original_price * discount_percentage / 100.0`."
            .to_string()
    } else {
        "unexpected prompt".to_string()
    };

    Json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": body["model"],
        "choices": [ { "index": 0, "message": { "role": "assistant", "content": reply } } ],
        "usage": { "prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49 }
    }))
    .into_response()
}

async fn spawn_fake(state: Arc<FakeOpenAi>) -> SocketAddr {
    let app = Router::new()
        .route("/v1/embeddings", post(embeddings))
        .route("/v1/chat/completions", post(chat))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn credentials(key: &str) -> Credentials {
    Credentials {
        openai_api_key: Some(key.to_string()),
        store_api_key: None,
    }
}

fn embedding_config(addr: SocketAddr) -> EmbeddingConfig {
    EmbeddingConfig {
        provider: EmbeddingProviderKind::Openai,
        model: Some("text-embedding-3-small".into()),
        dims: Some(4),
        base_url: format!("http://{}/v1", addr),
        batch_size: 3,
        backoff_ms: 1,
        ..Default::default()
    }
}

fn generation_config(addr: SocketAddr) -> GenerationConfig {
    GenerationConfig {
        base_url: format!("http://{}/v1", addr),
        backoff_ms: 1,
        ..Default::default()
    }
}

async fn indexed_store(tmp: &TempDir, addr: SocketAddr) -> SqliteStore {
    let store = SqliteStore::open(&tmp.path().join("pipeline.sqlite"))
        .await
        .unwrap();
    init_schema(&store, &SchemaConfig::default(), SchemaPolicy::Skip)
        .await
        .unwrap();

    let embedder = create_embedder(&embedding_config(addr), &credentials(API_KEY)).unwrap();
    let indexer = Indexer::new(&store, embedder.as_ref(), ChunkingConfig::default(), 3);
    for corpus in fixtures::all() {
        let report = indexer
            .index_document(corpus.collection, &corpus.document)
            .await
            .unwrap();
        assert_eq!(report.embedded, report.chunks);
    }
    store
}

#[tokio::test]
async fn test_semantic_retrieval_with_embeddings() {
    let fake = Arc::new(FakeOpenAi::default());
    let addr = spawn_fake(fake.clone()).await;
    let tmp = TempDir::new().unwrap();
    let store = indexed_store(&tmp, addr).await;

    // 6 requirement chunks in batches of 3, 2 code chunks in one batch.
    assert_eq!(fake.embedding_calls.load(Ordering::SeqCst), 3);

    let embedder = create_embedder(&embedding_config(addr), &credentials(API_KEY)).unwrap();
    let retriever = Retriever::new(&store, embedder.as_ref(), SearchMode::Semantic);

    let code = retriever
        .top(CODE_COLLECTION, "calculate_discounted_price")
        .await
        .unwrap();
    assert!(code.content.contains("fn calculate_discounted_price"));

    let reqs = retriever
        .top(REQUIREMENTS_COLLECTION, "calculate_discounted_price")
        .await
        .unwrap();
    assert!(reqs.content.starts_with("### `calculate_discounted_price` Function"));
    assert!((reqs.score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_generate_and_feedback_end_to_end() {
    let fake = Arc::new(FakeOpenAi {
        chat_failures: 1,
        ..Default::default()
    });
    let addr = spawn_fake(fake.clone()).await;
    let tmp = TempDir::new().unwrap();
    let store = indexed_store(&tmp, addr).await;

    let embedder = create_embedder(&embedding_config(addr), &credentials(API_KEY)).unwrap();
    let retriever = Retriever::new(&store, embedder.as_ref(), SearchMode::Keyword);
    let context = RetrievedContext::retrieve(&retriever, "calculate_discounted_price")
        .await
        .unwrap();

    let model = OpenAiChat::new(&generation_config(addr), &credentials(API_KEY)).unwrap();
    let orchestrator = Orchestrator::new(&model, "Rust's built-in test harness", 2);
    let generated = orchestrator.generate(&context).await.unwrap();

    // First chat call hit a 503 and was retried.
    assert_eq!(fake.chat_calls.load(Ordering::SeqCst), 3);
    assert_eq!(generated.test_cases, TABLE);
    assert_eq!(generated.unit_tests.test_fns, ["valid_discount", "negative_price"]);
    assert_eq!(generated.attempts, 1);

    let artifacts = Artifacts::new(tmp.path().join("out"));
    let (cases_path, tests_path) = artifacts.write_generated(&generated).unwrap();
    assert!(std::fs::read_to_string(cases_path).unwrap().contains("valid discount"));
    let written = std::fs::read_to_string(&tests_path).unwrap();
    assert!(written.starts_with("#[cfg(test)]"));
    assert_eq!(tests_path, artifacts.path(UNIT_TESTS_FILE));

    let report = TestReport::from_text(
        "test result: FAILED. 1 passed; 1 failed; 0 ignored; 0 measured; 0 filtered out",
    )
    .unwrap();
    let suggestions = orchestrator
        .synthesize_feedback(&context.code.content, &written, &report.render())
        .await
        .unwrap();
    assert!(suggestions.contains("applied twice"));

    store.close().await;
}

fn small_context() -> RetrievedContext {
    RetrievedContext {
        function: "f".into(),
        code: rag_testgen::models::SearchHit {
            id: "c".into(),
            content: "fn f() {}".into(),
            filepath: "codefile.rs".into(),
            score: 1.0,
        },
        requirements: rag_testgen::models::SearchHit {
            id: "r".into(),
            content: "f does nothing".into(),
            filepath: "srs_doc_1".into(),
            score: 1.0,
        },
    }
}

#[tokio::test]
async fn test_bad_key_is_connection_error() {
    let fake = Arc::new(FakeOpenAi::default());
    let addr = spawn_fake(fake.clone()).await;

    let model = OpenAiChat::new(&generation_config(addr), &credentials("sk-wrong")).unwrap();
    let orchestrator = Orchestrator::new(&model, "cargo test", 0);

    let err = orchestrator
        .synthesize_test_cases(&small_context())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Connection { .. }), "got {err:?}");
    // 401 is not retried.
    assert_eq!(fake.chat_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let fake = Arc::new(FakeOpenAi {
        reject_requests: true,
        ..Default::default()
    });
    let addr = spawn_fake(fake.clone()).await;

    let model = OpenAiChat::new(&generation_config(addr), &credentials(API_KEY)).unwrap();
    let orchestrator = Orchestrator::new(&model, "cargo test", 0);

    let err = orchestrator
        .synthesize_test_cases(&small_context())
        .await
        .unwrap_err();
    match err {
        Error::Generation(msg) => assert!(msg.contains("context length exceeded")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fake.chat_calls.load(Ordering::SeqCst), 1);
}
