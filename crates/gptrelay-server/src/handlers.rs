//! Chat-completions controller.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderValue};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::{future, Stream, StreamExt};
use tracing::{debug, info, warn};

use gptrelay_channels::EnvelopeStream;
use gptrelay_core::{CallContext, GatewayError, DONE_SENTINEL};

use crate::error::HttpError;
use crate::state::AppState;

/// Header naming the target channel (or `all`).
pub const CHANNEL_HEADER: &str = "x-channel";

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /v1/chat/completions`
///
/// Checks run in order: auth, channel header, command override, message
/// sanity, channel resolution. Nothing is sent upstream unless all pass.
pub async fn chat_completions(
    State(state): State<AppState>,
    req: Request,
) -> Result<Response, HttpError> {
    let headers = req.headers();
    check_auth(headers, &state.secret)?;

    let ctx = req
        .extensions()
        .get::<CallContext>()
        .cloned()
        .ok_or_else(|| GatewayError::validation("Request body must be a JSON chat request"))?;

    let mut channel = header_str(headers, CHANNEL_HEADER)
        .ok_or_else(|| GatewayError::validation("Missing header X-Channel"))?
        .to_string();
    if !state.registry.is_known(&channel) {
        return Err(
            GatewayError::validation(format!("Invalid header value X-Channel: {}", channel)).into(),
        );
    }

    let ctx = match command_override(&ctx)? {
        Some((target, rewritten)) => {
            debug!(from = %channel, to = %target, "Command override");
            channel = target;
            rewritten
        }
        None => ctx,
    };

    let request = ctx.request();
    if request.messages.is_empty() {
        return Err(GatewayError::validation("messages must not be empty").into());
    }
    if request.question().map_or(true, |q| q.trim().is_empty()) {
        return Err(GatewayError::validation("The last message must not be blank").into());
    }

    let streaming = ctx.wants_stream();
    let session = state.registry.resolve(&channel, streaming)?;
    info!(
        channel = %session.profile().name(),
        requested = %channel,
        streaming,
        "Dispatching chat"
    );

    let messages = request.messages.clone();
    let mut envelopes = state.normalizer.chat(session, &ctx, messages);

    if streaming {
        return Ok(sse_response(Body::from_stream(sse_frames(envelopes, channel))));
    }

    // Drain to the end so the normalizer finishes the call.
    let mut answer = None;
    while let Some(item) = envelopes.next().await {
        match item {
            Ok(payload) if payload == DONE_SENTINEL => {}
            Ok(payload) => {
                if answer.is_none() {
                    answer = Some(payload);
                }
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "Reply failed");
                break;
            }
        }
    }

    let mut response = Response::new(Body::from(answer.unwrap_or_default()));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn check_auth(headers: &HeaderMap, secret: &str) -> Result<(), GatewayError> {
    let Some(value) = header_str(headers, header::AUTHORIZATION.as_str()) else {
        return Err(GatewayError::Unauthorized(
            "Authorization is required".to_string(),
        ));
    };
    if !value.to_lowercase().contains(secret) {
        warn!("Rejected request with wrong credential");
        return Err(GatewayError::Forbidden("Request forbidden".to_string()));
    }
    Ok(())
}

/// A trimmed, non-empty header value.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `/name rest of question` targets channel `name` and forwards only
/// `rest of question`.
fn command_override(ctx: &CallContext) -> Result<Option<(String, CallContext)>, GatewayError> {
    let Some(question) = ctx.request().question() else {
        return Ok(None);
    };
    let Some(command) = question.trim_start().strip_prefix('/') else {
        return Ok(None);
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    if name.is_empty() || rest.is_empty() {
        return Err(GatewayError::validation(format!(
            "Command '/{}' must be followed by a question",
            name
        )));
    }

    let mut request = ctx.request().clone();
    request.set_question(rest);
    Ok(Some((name.to_string(), ctx.with_request(request))))
}

/// `data: <payload>\n\n` frames, ending at the first failed item.
fn sse_frames(
    envelopes: EnvelopeStream,
    channel: String,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    envelopes
        .take_while(move |item| {
            if let Err(e) = item {
                warn!(channel = %channel, error = %e, "Stream reply truncated");
            }
            future::ready(item.is_ok())
        })
        .filter_map(|item| future::ready(item.ok()))
        .map(|payload| Ok(Bytes::from(format!("data: {}\n\n", payload))))
}

fn sse_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use gptrelay_channels::SessionError;
    use gptrelay_core::{ChatMessage, ProxyRequest};
    use std::io::Write;
    use std::sync::{Arc, Mutex};

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
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn ctx_with(question: &str) -> CallContext {
        CallContext::new(ProxyRequest {
            messages: vec![ChatMessage::system("s"), ChatMessage::user(question)],
            ..Default::default()
        })
    }

    #[test]
    fn test_command_override() {
        let (name, ctx) = command_override(&ctx_with("/kimi What's the weather?"))
            .unwrap()
            .unwrap();
        assert_eq!(name, "kimi");
        assert_eq!(ctx.request().question(), Some("What's the weather?"));
        assert_eq!(ctx.request().messages.len(), 2);
    }

    #[test]
    fn test_plain_question_has_no_override() {
        assert!(command_override(&ctx_with("hello /kimi")).unwrap().is_none());
    }

    #[test]
    fn test_command_without_question() {
        assert!(command_override(&ctx_with("/kimi")).is_err());
        assert!(command_override(&ctx_with("/kimi   ")).is_err());
        assert!(command_override(&ctx_with("/ hello")).is_err());
    }

    #[test]
    fn test_check_auth() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            check_auth(&headers, "whoami"),
            Err(GatewayError::Unauthorized(_))
        ));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("  "));
        assert!(matches!(
            check_auth(&headers, "whoami"),
            Err(GatewayError::Unauthorized(_))
        ));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        assert!(matches!(
            check_auth(&headers, "whoami"),
            Err(GatewayError::Forbidden(_))
        ));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer WhoAmI"));
        assert!(check_auth(&headers, "whoami").is_ok());
    }

    #[tokio::test]
    async fn test_sse_frames_stop_at_failed_item() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let items: Vec<Result<String, SessionError>> = vec![
            Ok("{\"x\":1}".into()),
            Err(SessionError::Decode("connection reset".into())),
            Ok("[DONE]".into()),
        ];
        let frames: Vec<Bytes> = sse_frames(futures::stream::iter(items).boxed(), "kimi".into())
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(frames, vec![Bytes::from("data: {\"x\":1}\n\n")]);
        let logs = logs.contents();
        assert!(logs.contains("Stream reply truncated"));
        assert!(logs.contains("connection reset"));
    }
}
