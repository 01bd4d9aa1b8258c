//! OpenAI-family backends.
//!
//! These already speak the canonical format, so replies are handed back
//! untouched: the raw JSON body for single-shot calls and each SSE `data:`
//! payload (upstream `[DONE]` included) for streamed ones.

use async_stream::stream;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use tracing::{debug, error, warn};

use gptrelay_core::config::ChannelConfig;
use gptrelay_core::{CallContext, ChatMessage, DONE_SENTINEL};
use gptrelay_transport::HttpTransport;

use crate::request::{auth_headers, UpstreamRequest};
use crate::session::{ChannelProfile, ChatSession, FragmentStream};
use crate::sse::data_events;

pub struct OpenAiSession {
    profile: ChannelProfile,
    transport: HttpTransport,
    endpoint: String,
    headers: HeaderMap,
}

impl std::fmt::Debug for OpenAiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiSession")
            .field("channel", &self.profile.name())
            .field("endpoint", &self.endpoint)
            .field("streaming", &self.profile.is_streaming())
            .finish()
    }
}

impl OpenAiSession {
    pub fn new(config: &ChannelConfig, streaming: bool, transport: HttpTransport) -> Self {
        let profile = ChannelProfile::new(config.name.clone())
            .native(true)
            .streaming(streaming)
            .weight(config.weight)
            .model(config.model.clone());

        OpenAiSession {
            profile,
            transport,
            endpoint: config.endpoint(),
            headers: auth_headers(&config.api_key, config.extra_headers.as_ref()),
        }
    }
}

impl ChatSession for OpenAiSession {
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
            return stream! {
                match transport.post_json_text(&url, &body, &headers, None).await {
                    Some(text) => yield Ok(text),
                    None => warn!(channel = %channel, "Upstream produced no answer"),
                }
            }
            .boxed();
        }

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
                match event {
                    Ok(payload) => {
                        let done = payload == DONE_SENTINEL;
                        yield Ok(payload);
                        if done {
                            break;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }
        .boxed()
    }
}
