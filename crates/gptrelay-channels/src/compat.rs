//! Chat-completions-like backends whose replies are not canonical.
//!
//! The answer text is pulled out of each reply with a JSON pointer and
//! handed to the normalizer for re-wrapping. Such backends usually lack a
//! system role, so conversations are flattened before they get here.

use async_stream::stream;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, error, warn};

use gptrelay_core::config::ChannelConfig;
use gptrelay_core::{CallContext, ChatMessage, DONE_SENTINEL};
use gptrelay_transport::HttpTransport;

use crate::request::{auth_headers, UpstreamRequest};
use crate::session::{ChannelProfile, ChatSession, FragmentStream};
use crate::sse::data_events;

pub const DEFAULT_ANSWER_POINTER: &str = "/choices/0/message/content";
pub const DEFAULT_DELTA_POINTER: &str = "/choices/0/delta/content";

// ─────────────────────────────────────────────
// StopMarker
// ─────────────────────────────────────────────

/// Early-termination rule: the reply is over once the accumulated text
/// contains the marker. An unset or empty marker never fires.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StopMarker(Option<String>);

impl StopMarker {
    pub fn new(marker: Option<String>) -> Self {
        StopMarker(marker.filter(|m| !m.is_empty()))
    }

    pub fn is_reached(&self, accumulated: &str, latest: &str) -> bool {
        let Some(ref marker) = self.0 else {
            return false;
        };
        if latest.contains(marker.as_str()) {
            return true;
        }
        // The marker may straddle the boundary between fragments.
        let mut joined = String::with_capacity(accumulated.len() + latest.len());
        joined.push_str(accumulated);
        joined.push_str(latest);
        joined.contains(marker.as_str())
    }
}

// ─────────────────────────────────────────────
// CompatSession
// ─────────────────────────────────────────────

pub struct CompatSession {
    profile: ChannelProfile,
    transport: HttpTransport,
    endpoint: String,
    headers: HeaderMap,
    answer_pointer: String,
    delta_pointer: String,
    stop: StopMarker,
}

impl std::fmt::Debug for CompatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompatSession")
            .field("channel", &self.profile.name())
            .field("endpoint", &self.endpoint)
            .field("streaming", &self.profile.is_streaming())
            .field("stop", &self.stop)
            .finish()
    }
}

impl CompatSession {
    pub fn new(config: &ChannelConfig, streaming: bool, transport: HttpTransport) -> Self {
        let profile = ChannelProfile::new(config.name.clone())
            .native(false)
            .streaming(streaming)
            .weight(config.weight)
            .model(config.model.clone());

        CompatSession {
            profile,
            transport,
            endpoint: config.endpoint(),
            headers: auth_headers(&config.api_key, config.extra_headers.as_ref()),
            answer_pointer: config
                .answer_pointer
                .clone()
                .unwrap_or_else(|| DEFAULT_ANSWER_POINTER.to_string()),
            delta_pointer: config
                .delta_pointer
                .clone()
                .unwrap_or_else(|| DEFAULT_DELTA_POINTER.to_string()),
            stop: StopMarker::new(config.stop_marker.clone()),
        }
    }
}

fn text_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl ChatSession for CompatSession {
    fn profile(&self) -> &ChannelProfile {
        &self.profile
    }

    fn send_chat(
        &self,
        ctx: &CallContext,
        _question: &str,
        messages: Vec<ChatMessage>,
    ) -> FragmentStream {
        let streaming = self.profile.is_streaming();
        let body = UpstreamRequest::new(
            ctx.request(),
            messages,
            self.profile.default_model(),
            streaming,
        )
        .into_value();

        let transport = self.transport.clone();
        let url = self.endpoint.clone();
        let headers = self.headers.clone();
        let channel = self.profile.name().to_string();

        debug!(channel = %channel, url = %url, streaming, "Calling upstream");

        if !streaming {
            let pointer = self.answer_pointer.clone();
            return stream! {
                let Some(reply) = transport.post_json::<_, Value>(&url, &body, &headers).await else {
                    warn!(channel = %channel, "Upstream produced no answer");
                    return;
                };
                match text_at(&reply, &pointer) {
                    Some(text) => yield Ok(text),
                    None => warn!(channel = %channel, pointer = %pointer, "No answer text in upstream reply"),
                }
            }
            .boxed();
        }

        let pointer = self.delta_pointer.clone();
        stream! {
            let body_stream = match transport.open_stream(&url, &body, &headers).await {
                Ok(s) => s,
                Err(e) => {
                    error!(channel = %channel, error = %e, "Upstream stream failed to open");
                    return;
                }
            };
            let mut events = data_events(body_stream);
            while let Some(event) = events.next().await {
                let payload = match event {
                    Ok(p) => p,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                if payload == DONE_SENTINEL {
                    break;
                }
                match serde_json::from_str::<Value>(&payload) {
                    Ok(value) => {
                        if let Some(text) = text_at(&value, &pointer) {
                            yield Ok(text);
                        }
                    }
                    Err(e) => warn!(channel = %channel, error = %e, "Skipping undecodable stream event"),
                }
            }
        }
        .boxed()
    }

    fn is_terminal(&self, accumulated: &str, latest: &str) -> bool {
        self.stop.is_reached(accumulated, latest)
    }
}
