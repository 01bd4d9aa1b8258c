//! Turns a session's raw fragments into canonical output.
//!
//! Native backends are passed through. Everything else is re-wrapped into
//! `chat.completion.chunk` envelopes that share one id and one `created`
//! timestamp per call. Streaming output always ends with exactly one
//! `[DONE]`.

use std::sync::Arc;

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

use gptrelay_core::utils::{truncate_string, unix_now};
use gptrelay_core::{CallContext, CanonicalAnswer, ChatMessage, DONE_SENTINEL};

use crate::error::SessionError;
use crate::session::{flatten_roles, ChatSession, FragmentStream};

/// Canonical payloads for one call: serialized envelopes, native JSON, or
/// the `[DONE]` sentinel. Transport framing is left to the caller.
pub type EnvelopeStream = BoxStream<'static, Result<String, SessionError>>;

const LOGGED_QUESTION_CHARS: usize = 200;

#[derive(Clone, Debug, Default)]
pub struct Normalizer {
    print_answers: bool,
}

impl Normalizer {
    pub fn new(print_answers: bool) -> Self {
        Normalizer { print_answers }
    }

    /// Run one call against `session`.
    ///
    /// The last message, as sent by the caller, is the active question.
    /// System messages are then flattened when the backend has no system
    /// role.
    pub fn chat(
        &self,
        session: Arc<dyn ChatSession>,
        ctx: &CallContext,
        messages: Vec<ChatMessage>,
    ) -> EnvelopeStream {
        let profile = session.profile();
        let native = profile.supports_native_system_role();
        let streaming = profile.is_streaming();
        let channel = profile.name().to_string();

        let question = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let messages = if native {
            messages
        } else {
            flatten_roles(messages)
        };

        if self.print_answers {
            info!(
                channel = %channel,
                streaming,
                question = %truncate_string(&question, LOGGED_QUESTION_CHARS),
                "Forwarding question"
            );
        }

        let fragments = session.send_chat(ctx, &question, messages);

        if native {
            passthrough(fragments, channel, streaming, self.print_answers)
        } else {
            let model = ctx
                .request()
                .model
                .clone()
                .unwrap_or_else(|| session.profile().default_model().to_string());
            wrap(session, fragments, model, streaming, self.print_answers)
        }
    }
}

fn passthrough(
    mut fragments: FragmentStream,
    channel: String,
    streaming: bool,
    print_answers: bool,
) -> EnvelopeStream {
    stream! {
        let mut answer = String::new();
        let mut done = false;
        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    if fragment.trim() == DONE_SENTINEL {
                        done = true;
                        yield Ok(DONE_SENTINEL.to_string());
                        break;
                    }
                    if print_answers {
                        if let Some(text) = native_text(&fragment, streaming) {
                            answer.push_str(&text);
                        }
                    }
                    yield Ok(fragment);
                }
                Err(e) => {
                    error!(channel = %channel, error = %e, "Reply aborted");
                    yield Err(e);
                    return;
                }
            }
        }
        if streaming && !done {
            debug!(channel = %channel, "Upstream ended without [DONE]; appending");
            yield Ok(DONE_SENTINEL.to_string());
        }
        log_answer(print_answers, &channel, &answer);
    }
    .boxed()
}

fn wrap(
    session: Arc<dyn ChatSession>,
    mut fragments: FragmentStream,
    model: String,
    streaming: bool,
    print_answers: bool,
) -> EnvelopeStream {
    let id = format!("chatcmpl-{}", Uuid::new_v4().simple());
    let created = unix_now();

    stream! {
        let channel = session.profile().name().to_string();
        let mut answer = String::new();
        let mut terminated = false;

        while let Some(item) = fragments.next().await {
            let fragment = match item {
                Ok(f) => f,
                Err(e) => {
                    error!(channel = %channel, error = %e, "Reply aborted");
                    yield Err(e);
                    return;
                }
            };

            if session.is_terminal(&answer, &fragment) {
                debug!(channel = %channel, "Backend signalled end of reply");
                terminated = true;
                break;
            }
            answer.push_str(&fragment);

            let envelope = if streaming {
                CanonicalAnswer::delta(&id, created, &model, fragment)
            } else {
                CanonicalAnswer::message(&id, created, &model, fragment)
            };
            match envelope.to_json() {
                Ok(json) => yield Ok(json),
                Err(e) => {
                    error!(channel = %channel, error = %e, "Failed to encode envelope");
                    yield Err(SessionError::Decode(e.to_string()));
                    return;
                }
            }
        }

        if streaming || terminated {
            yield Ok(DONE_SENTINEL.to_string());
        }
        log_answer(print_answers, &channel, &answer);
    }
    .boxed()
}

/// Answer text inside a canonical payload, for logging.
fn native_text(payload: &str, streaming: bool) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let pointer = if streaming {
        "/choices/0/delta/content"
    } else {
        "/choices/0/message/content"
    };
    value.pointer(pointer)?.as_str().map(str::to_string)
}

fn log_answer(print_answers: bool, channel: &str, answer: &str) {
    if print_answers {
        info!(channel = %channel, answer = %answer, "Answer complete");
    }
}
