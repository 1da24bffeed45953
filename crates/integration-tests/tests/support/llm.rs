#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::Mutex;

const FALLBACK_REPLY: &str = "mock reply";

/// One scripted chat-completions response.
#[derive(Debug, Clone)]
pub enum MockCompletion {
    Content(String),
    Failure { status: StatusCode, code: String },
}

impl MockCompletion {
    pub fn content(content: impl Into<String>) -> Self {
        Self::Content(content.into())
    }

    pub fn failure(status: StatusCode, code: impl Into<String>) -> Self {
        Self::Failure {
            status,
            code: code.into(),
        }
    }
}

#[derive(Clone, Default)]
struct MockLlmState {
    replies: Arc<Mutex<VecDeque<MockCompletion>>>,
    payloads: Arc<Mutex<Vec<Value>>>,
}

/// In-process stand-in for the OpenAI chat-completions endpoint.
///
/// Scripted replies are served in order; once they run out every call gets
/// a fixed reply. Request bodies are recorded for assertions.
pub struct MockLlm {
    pub chat_completions_url: String,
    state: MockLlmState,
    handle: tokio::task::JoinHandle<()>,
}

impl MockLlm {
    pub async fn start(replies: Vec<MockCompletion>) -> Self {
        let state = MockLlmState {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            payloads: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .with_state(state.clone());
        let (bind_addr, handle) = serve(app).await;

        Self {
            chat_completions_url: format!("http://{bind_addr}/v1/chat/completions"),
            state,
            handle,
        }
    }

    pub async fn payloads(&self) -> Vec<Value> {
        self.state.payloads.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.state.payloads.lock().await.len()
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn chat_completions(
    State(state): State<MockLlmState>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.payloads.lock().await.push(payload);
    let reply = state
        .replies
        .lock()
        .await
        .pop_front()
        .unwrap_or_else(|| MockCompletion::content(FALLBACK_REPLY));

    match reply {
        MockCompletion::Content(content) => (
            StatusCode::OK,
            Json(json!({
                "id": "chatcmpl-mock",
                "model": "gpt-mock",
                "choices": [{"message": {"role": "assistant", "content": content}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            })),
        ),
        MockCompletion::Failure { status, code } => (
            status,
            Json(json!({"error": {"code": code, "message": "mock provider failure"}})),
        ),
    }
}

pub async fn serve(app: Router) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("mock listener should bind");
    let bind_addr = listener
        .local_addr()
        .expect("mock listener local address should be available");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server should run");
    });

    (bind_addr, handle)
}
