//! Shared helpers for the integration tests.
//!
//! `MockEndpoint` serves a canned chat-completion reply from a background
//! thread with its own tokio runtime, so the blocking client under test never
//! runs inside an async context.

use std::{
    net::TcpListener,
    sync::{Arc, Mutex},
    thread,
};

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{
        HeaderMap, HeaderName, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::post,
};
use serde_json::{Value, json};

pub const COMPLETIONS_PATH: &str = "/openai/v1/chat/completions";

/// One request as seen by the mock.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Value,
}

impl CapturedRequest {
    /// The `url` of the image part of the first message.
    #[allow(dead_code)]
    pub fn image_url(&self) -> &str {
        self.body["messages"][0]["content"][1]["image_url"]["url"]
            .as_str()
            .expect("request has no image url")
    }
}

struct MockState {
    status: StatusCode,
    body: String,
    captured: Mutex<Vec<CapturedRequest>>,
}

pub struct MockEndpoint {
    pub url: String,
    state: Arc<MockState>,
}

impl MockEndpoint {
    pub fn start(status: StatusCode, body: impl Into<String>) -> Self {
        let state = Arc::new(MockState {
            status,
            body: body.into(),
            captured: Mutex::new(Vec::new()),
        });

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock endpoint");
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let app = Router::new()
            .route(COMPLETIONS_PATH, post(respond))
            .with_state(state.clone());

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });

        Self {
            url: format!("http://{addr}{COMPLETIONS_PATH}"),
            state,
        }
    }

    /// A 200 reply whose first choice says `content`.
    pub fn answering(content: &str) -> Self {
        Self::start(StatusCode::OK, completion_body(content))
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.state.captured.lock().unwrap().clone()
    }
}

pub fn completion_body(content: &str) -> String {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "meta-llama/llama-4-scout-17b-16e-instruct",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
    .to_string()
}

/// A URL on which nothing is listening.
#[allow(dead_code)]
pub fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}{COMPLETIONS_PATH}")
}

fn header(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn respond(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    state.captured.lock().unwrap().push(CapturedRequest {
        authorization: header(&headers, AUTHORIZATION),
        content_type: header(&headers, CONTENT_TYPE),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });
    (state.status, state.body.clone())
}
