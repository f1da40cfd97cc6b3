//! An agent turn whose tool back-end answers 429 before succeeding.
//!
//! Run with: `cargo test -p reelsmith-agent --test rate_limited_tool`

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::json;

use reelsmith_agent::AgentInvoker;
use reelsmith_core::config::Config;
use reelsmith_core::retry::RetryPolicy;
use reelsmith_providers::scripted::{ScriptedProvider, ScriptedReply};
use reelsmith_tools::knowledge::KnowledgeTool;
use reelsmith_tools::rate_limit::TokenBucket;
use reelsmith_tools::{ToolContext, ToolSet};

const AUDIENCE: &str = "Health-conscious parents, 30-45, who cook at home.";

async fn predict(State(hits): State<Arc<AtomicUsize>>) -> Response {
    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "2")],
            "too many requests",
        )
            .into_response();
    }
    Json(json!({ "text": AUDIENCE })).into_response()
}

async fn knowledge_server() -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/api/v1/prediction/avatar", post(predict))
        .with_state(hits.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api/v1/prediction/avatar"), hits)
}

async fn run_turn(provider: Arc<ScriptedProvider>, knowledge_url: &str) -> (String, Duration) {
    let config = Config::from_json5(&format!(r#"{{ tools: {{ knowledge_url: "{knowledge_url}" }} }}"#))
        .unwrap();
    let ctx = ToolContext::new(Arc::new(config))
        .unwrap()
        .with_retry(RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(10),
            jitter: false,
        })
        .with_page_limiter(Arc::new(TokenBucket::new(10, 10.0)));
    let invoker = AgentInvoker::new(provider, "test-model", ctx);
    let tools = ToolSet::new().with(KnowledgeTool::avatar());

    let started = Instant::now();
    let reply = invoker
        .invoke(
            "You are the Trend and Audience analyst.",
            &tools,
            "Analyse the audience for a video on sugar metabolism.",
            &[],
        )
        .await
        .unwrap();
    (reply.text, started.elapsed())
}

#[tokio::test]
async fn test_tool_retry_after_is_invisible_to_the_agent() {
    let (url, hits) = knowledge_server().await;
    let provider = Arc::new(ScriptedProvider::new().on(
        "Audience analyst",
        vec![
            ScriptedReply::tool_call("Avatar", json!({"question": "Who is the target viewer?"})),
            ScriptedReply::text("Audience: parents who cook at home."),
        ],
    ));

    let (text, elapsed) = run_turn(provider.clone(), &url).await;

    assert_eq!(text, "Audience: parents who cook at home.");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(elapsed >= Duration::from_millis(1900), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(8), "elapsed {elapsed:?}");

    // The model saw the successful tool result, not the 429.
    let requests = provider.requests();
    let tool_result = requests[1].messages.last().unwrap();
    assert_eq!(tool_result["is_error"], false);
    assert_eq!(tool_result["content"], AUDIENCE);
}

#[tokio::test]
async fn test_same_turn_without_rate_limit_gives_same_answer() {
    let (url, hits) = knowledge_server().await;
    // Consume the throttled response up front.
    hits.store(1, Ordering::SeqCst);
    let provider = Arc::new(ScriptedProvider::new().on(
        "Audience analyst",
        vec![
            ScriptedReply::tool_call("Avatar", json!({"question": "Who is the target viewer?"})),
            ScriptedReply::text("Audience: parents who cook at home."),
        ],
    ));

    let (text, elapsed) = run_turn(provider, &url).await;
    assert_eq!(text, "Audience: parents who cook at home.");
    assert!(elapsed < Duration::from_millis(1900));
}
