//! Outbound request shape shared by the chat-completions adapters.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use tracing::warn;

use gptrelay_core::{ChatMessage, ProxyRequest};

/// Body POSTed to a chat-completions endpoint.
#[derive(Debug, Serialize)]
pub struct UpstreamRequest<'a> {
    pub messages: Vec<ChatMessage>,
    pub model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<&'a [serde_json::Value]>,
}

impl<'a> UpstreamRequest<'a> {
    /// Sampling parameters come from the caller's request; `model` falls
    /// back to `default_model` when the caller named none.
    pub fn new(
        request: &'a ProxyRequest,
        messages: Vec<ChatMessage>,
        default_model: &'a str,
        stream: bool,
    ) -> Self {
        UpstreamRequest {
            messages,
            model: request.model.as_deref().unwrap_or(default_model),
            temperature: request.temperature,
            top_p: request.top_p,
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
            stream,
            tools: request.tools.as_deref(),
        }
    }

    /// Owned JSON form, for moving into a lazily-polled stream.
    pub fn into_value(self) -> serde_json::Value {
        serde_json::to_value(&self).unwrap_or(serde_json::Value::Null)
    }
}

/// `Authorization: Bearer <key>` plus any configured extra headers.
/// Invalid header names or values are skipped with a warning.
pub fn auth_headers(api_key: &str, extra: Option<&HashMap<String, String>>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if !api_key.is_empty() {
        match HeaderValue::from_str(&format!("Bearer {}", api_key)) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!("API key contains characters not allowed in a header"),
        }
    }
    if let Some(extra) = extra {
        for (key, value) in extra {
            if let (Ok(name), Ok(val)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, val);
            } else {
                warn!("Invalid header: {}", key);
            }
        }
    }
    headers
}
