//! Router-level tests: requests go through the interceptor and controller,
//! upstream backends are wiremock servers.

use std::io::Write;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::Request as AxumRequest;
use axum::http::{Method, Request, StatusCode};
use axum::middleware;
use axum::routing::post;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gptrelay_channels::ChannelRegistry;
use gptrelay_core::config::{ChannelConfig, ChannelKind, Config};
use gptrelay_core::CallContext;
use gptrelay_server::interceptor::intercept;
use gptrelay_server::{create_router, AppState};

fn test_config(upstream: &str) -> Config {
    let mut config = Config::default();
    config.server.max_body_bytes = 1024;
    config.log.print_answers = false;
    config.channels = vec![
        ChannelConfig {
            name: "openai".into(),
            base_url: upstream.to_string(),
            api_key: "sk-test".into(),
            ..Default::default()
        },
        ChannelConfig {
            name: "kimi".into(),
            kind: ChannelKind::Compat,
            base_url: upstream.to_string(),
            path: "/kimi/chat".into(),
            api_key: "kimi-key".into(),
            model: "moonshot-v1-8k".into(),
            ..Default::default()
        },
    ];
    config
}

fn test_state(upstream: &str) -> AppState {
    let config = test_config(upstream);
    let registry = ChannelRegistry::from_config(&config).unwrap();
    AppState::new(&config, registry)
}

fn app(upstream: &str) -> Router {
    create_router(test_state(upstream))
}

fn chat_request(auth: Option<&str>, channel: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/v1/chat/completions")
        .header("content-type", "application/json");
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    if let Some(channel) = channel {
        builder = builder.header("x-channel", channel);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn simple_body(question: &str) -> Value {
    json!({"messages": [{"role": "user", "content": question}]})
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    /// Capture this thread's logs until the guard drops.
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

async fn silent_upstream() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    server
}

// ─────────────────────────────────────────────
// Boundary checks
// ─────────────────────────────────────────────

#[tokio::test]
async fn missing_auth_is_401_without_upstream_call() {
    let server = silent_upstream().await;
    let response = app(&server.uri())
        .oneshot(chat_request(None, Some("openai"), simple_body("hi")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({"code": 401, "message": "Authorization is required", "data": null})
    );
}

#[tokio::test]
async fn wrong_auth_is_403() {
    let server = silent_upstream().await;
    let response = app(&server.uri())
        .oneshot(chat_request(Some("Bearer nope"), Some("openai"), simple_body("hi")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["message"], "Request forbidden");
}

#[tokio::test]
async fn missing_channel_is_400() {
    let server = silent_upstream().await;
    let response = app(&server.uri())
        .oneshot(chat_request(Some("Bearer whoami"), None, simple_body("hi")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Missing header X-Channel");
}

#[tokio::test]
async fn unknown_channel_is_400() {
    let server = silent_upstream().await;
    let response = app(&server.uri())
        .oneshot(chat_request(Some("Bearer whoami"), Some("glm"), simple_body("hi")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["message"],
        "Invalid header value X-Channel: glm"
    );
}

#[tokio::test]
async fn empty_messages_and_blank_question_are_400() {
    let server = silent_upstream().await;
    let router = app(&server.uri());

    let response = router
        .clone()
        .oneshot(chat_request(Some("whoami"), Some("openai"), json!({"messages": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .oneshot(chat_request(Some("whoami"), Some("openai"), simple_body("   ")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_is_400() {
    let server = silent_upstream().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .header("authorization", "whoami")
        .header("x-channel", "openai")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app(&server.uri()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], 400);
}

#[tokio::test]
async fn oversized_body_is_413() {
    let server = silent_upstream().await;
    let big = "x".repeat(4096);
    let response = app(&server.uri())
        .oneshot(chat_request(Some("whoami"), Some("openai"), simple_body(&big)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(body_json(response).await["code"], 413);
}

#[tokio::test]
async fn preflight_is_empty_200_with_cors() {
    let server = silent_upstream().await;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/v1/chat/completions")
        .body(Body::empty())
        .unwrap();

    let response = app(&server.uri()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-credentials"], "true");
    assert_eq!(
        headers["access-control-allow-methods"],
        "GET, HEAD, POST, PUT, PATCH, DELETE, OPTIONS"
    );
    assert_eq!(headers["access-control-max-age"], "86400");
    assert!(body_string(response).await.is_empty());
}

#[tokio::test]
async fn health_endpoint() {
    let server = silent_upstream().await;
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app(&server.uri()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

// ─────────────────────────────────────────────
// Interceptor replay
// ─────────────────────────────────────────────

#[tokio::test]
async fn body_is_replayed_and_context_published() {
    let server = silent_upstream().await;
    let state = test_state(&server.uri());

    async fn echo(req: AxumRequest) -> String {
        let has_ctx = req.extensions().get::<CallContext>().is_some();
        let bytes = req.into_body().collect().await.unwrap().to_bytes();
        format!("{}|{}", has_ctx, String::from_utf8(bytes.to_vec()).unwrap())
    }

    let router = Router::new()
        .route("/echo", post(echo))
        .layer(middleware::from_fn_with_state(state, intercept));

    let raw = r#"{"messages":[{"role":"user","content":"hi"}],  "extra":1}"#;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .header("content-type", "application/json")
        .body(Body::from(raw))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(body_string(response).await, format!("true|{}", raw));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/echo")
        .header("content-type", "text/plain")
        .body(Body::from("plain"))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(body_string(response).await, "false|plain");
}

// ─────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────

#[tokio::test]
async fn native_single_shot_passes_through() {
    let server = MockServer::start().await;
    let upstream = json!({
        "id": "chatcmpl-up",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}}]
    });
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [{"role": "system", "content": "X"}, {"role": "user", "content": "Y"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let body = json!({"messages": [
        {"role": "system", "content": "X"},
        {"role": "user", "content": "Y"}
    ]});
    let response = app(&server.uri())
        .oneshot(chat_request(Some("Bearer whoami"), Some("openai"), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(body_json(response).await, upstream);
}

#[tokio::test]
async fn command_override_routes_to_named_channel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kimi/chat"))
        .and(body_partial_json(json!({
            "messages": [{"role": "user", "content": "What's the weather?"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Sunny"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let response = app(&server.uri())
        .oneshot(chat_request(
            Some("whoami"),
            Some("openai"),
            simple_body("/kimi What's the weather?"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let envelope = body_json(response).await;
    assert_eq!(envelope["object"], "chat.completion.chunk");
    assert_eq!(envelope["model"], "moonshot-v1-8k");
    assert_eq!(envelope["choices"][0]["message"]["content"], "Sunny");
    assert_eq!(envelope["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn upstream_failure_gives_empty_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let response = app(&server.uri())
        .oneshot(chat_request(Some("whoami"), Some("kimi"), simple_body("hi")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.is_empty());
}

#[tokio::test]
async fn single_shot_answer_is_logged_when_enabled() {
    let logs = LogBuffer::default();
    let _guard = logs.install();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/kimi/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hi there"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.log.print_answers = true;
    let registry = ChannelRegistry::from_config(&config).unwrap();
    let response = create_router(AppState::new(&config, registry))
        .oneshot(chat_request(Some("whoami"), Some("kimi"), simple_body("hello")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["choices"][0]["message"]["content"], "Hi there");

    let logs = logs.contents();
    assert!(logs.contains("Forwarding question"));
    assert!(logs.contains("Answer complete"));
}

#[tokio::test]
async fn streaming_reply_is_framed_as_sse() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"!\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/kimi/chat"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse),
        )
        .expect(1)
        .mount(&server)
        .await;

    let body = json!({"stream": true, "messages": [{"role": "user", "content": "hi"}]});
    let response = app(&server.uri())
        .oneshot(chat_request(Some("whoami"), Some("kimi"), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(response.headers()["cache-control"], "no-cache");
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let text = body_string(response).await;
    let frames: Vec<&str> = text
        .split("\n\n")
        .filter(|f| !f.is_empty())
        .map(|f| f.strip_prefix("data: ").unwrap())
        .collect();
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[3], "[DONE]");

    let chunks: Vec<Value> = frames[..3]
        .iter()
        .map(|f| serde_json::from_str(f).unwrap())
        .collect();
    let contents: Vec<&str> = chunks
        .iter()
        .map(|c| c["choices"][0]["delta"]["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["Hel", "lo", "!"]);
    assert!(chunks.iter().all(|c| c["id"] == chunks[0]["id"]));
}

#[tokio::test]
async fn all_rotates_between_channels() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"from": "openai"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/kimi/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "from kimi"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let router = app(&server.uri());
    let first = router
        .clone()
        .oneshot(chat_request(Some("whoami"), Some("all"), simple_body("one")))
        .await
        .unwrap();
    assert_eq!(body_json(first).await["from"], "openai");

    let second = router
        .oneshot(chat_request(Some("whoami"), Some("all"), simple_body("two")))
        .await
        .unwrap();
    assert_eq!(
        body_json(second).await["choices"][0]["message"]["content"],
        "from kimi"
    );
}
