//! Request interceptor.
//!
//! Runs in front of every route:
//! - stamps CORS headers on every response, errors and preflights included
//! - answers `OPTIONS` directly
//! - buffers JSON bodies (capped), parses them into a [`CallContext`] stored
//!   in the request extensions, then replays the original bytes downstream
//! - marks streaming replies as `text/event-stream`

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;
use tracing::{debug, warn};

use gptrelay_core::{CallContext, GatewayError, ProxyRequest};

use crate::error::HttpError;
use crate::state::AppState;

const ALLOW_METHODS: &str = "GET, HEAD, POST, PUT, PATCH, DELETE, OPTIONS";
const MAX_AGE_SECS: &str = "86400";

pub async fn intercept(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        match process(&state, req, next).await {
            Ok(r) => r,
            Err(e) => e.into_response(),
        }
    };
    apply_cors(response.headers_mut());
    response
}

async fn process(state: &AppState, req: Request, next: Next) -> Result<Response, HttpError> {
    if !is_json(req.headers()) {
        return Ok(next.run(req).await);
    }

    let (mut parts, body) = req.into_parts();
    let bytes = to_bytes(body, state.max_body_bytes).await.map_err(|e| {
        if e.into_inner().is::<LengthLimitError>() {
            warn!(limit = state.max_body_bytes, "Request body too large");
            HttpError::from(GatewayError::PayloadTooLarge {
                limit: state.max_body_bytes,
            })
        } else {
            HttpError::bad_request("Failed to read request body")
        }
    })?;

    let text = std::str::from_utf8(&bytes)
        .map_err(|_| HttpError::bad_request("Request body is not valid UTF-8"))?;

    let mut streaming = false;
    if !text.trim().is_empty() {
        let request: ProxyRequest = serde_json::from_str(text)
            .map_err(|e| HttpError::bad_request(format!("Invalid request body: {}", e)))?;
        streaming = request.wants_stream();
        debug!(
            messages = request.messages.len(),
            stream = streaming,
            "Parsed chat request"
        );
        parts.extensions.insert(CallContext::new(request));
    }

    let req = Request::from_parts(parts, Body::from(bytes));
    let mut response = next.run(req).await;

    if streaming && response.status().is_success() {
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    }
    Ok(response)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false)
}

fn apply_cors(headers: &mut HeaderMap) {
    let any = HeaderValue::from_static("*");
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, any.clone());
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(MAX_AGE_SECS),
    );
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, any);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_json() {
        let mut headers = HeaderMap::new();
        assert!(!is_json(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=utf-8"),
        );
        assert!(is_json(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!is_json(&headers));
    }

    #[test]
    fn test_apply_cors() {
        let mut headers = HeaderMap::new();
        apply_cors(&mut headers);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], ALLOW_METHODS);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "*");
    }
}
