//! Core types for gptrelay: the canonical chat-completions wire format.
//!
//! Inbound requests and outbound answers both use the OpenAI
//! chat-completions shape. Backends that speak something else are adapted
//! in `gptrelay-channels`; everything that crosses a crate boundary is one
//! of the types below.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Literal that terminates every streaming reply.
pub const DONE_SENTINEL: &str = "[DONE]";

/// `object` tag carried by every canonical envelope.
pub const CHUNK_OBJECT: &str = "chat.completion.chunk";

/// Synthetic assistant reply inserted after a flattened system message.
pub const ASSISTANT_ACK: &str = "OK";

// ─────────────────────────────────────────────
// Roles & messages
// ─────────────────────────────────────────────

/// Speaker of a chat message.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One message of a conversation.
///
/// Serialized as `{"role": ..., "content": ...}`. The `deletable` flag is
/// local bookkeeping and never goes over the wire: system messages are
/// pinned, everything else may be pruned by a caller.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(from = "RawMessage")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(skip)]
    deletable: bool,
}

impl ChatMessage {
    /// Build a message with the given role. Only system messages are pinned.
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: content.into(),
            deletable: role != ChatRole::System,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    /// Whether a caller may drop this message when trimming context.
    pub fn is_deletable(&self) -> bool {
        self.deletable
    }
}

/// Wire form of a message. Content may be a plain string, an array of
/// typed parts (vision clients), or null.
#[derive(Deserialize)]
struct RawMessage {
    role: ChatRole,
    #[serde(default)]
    content: Option<RawContent>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Parts(Vec<RawPart>),
}

#[derive(Deserialize)]
struct RawPart {
    #[serde(default)]
    text: Option<String>,
}

impl From<RawMessage> for ChatMessage {
    fn from(raw: RawMessage) -> Self {
        let content = match raw.content {
            Some(RawContent::Text(text)) => text,
            Some(RawContent::Parts(parts)) => parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        };
        ChatMessage::new(raw.role, content)
    }
}

// ─────────────────────────────────────────────
// Inbound request
// ─────────────────────────────────────────────

/// A canonical chat-completions request as received from a caller.
///
/// Unknown fields are ignored. The target channel is not part of the body;
/// it comes from the `X-Channel` header.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProxyRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Tool definitions, forwarded to the backend verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
}

impl ProxyRequest {
    /// Whether the caller asked for a streamed reply.
    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Content of the active (last) message.
    pub fn question(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }

    /// Replace the content of the active message, keeping its role.
    pub fn set_question(&mut self, question: impl Into<String>) {
        if let Some(last) = self.messages.last_mut() {
            last.content = question.into();
        }
    }
}

/// Per-call state handed explicitly through every pipeline stage.
///
/// Built once by the request interceptor and dropped when the call ends.
/// Cloning is cheap; the parsed request is shared read-only.
#[derive(Clone, Debug)]
pub struct CallContext {
    request: Arc<ProxyRequest>,
}

impl CallContext {
    pub fn new(request: ProxyRequest) -> Self {
        CallContext {
            request: Arc::new(request),
        }
    }

    pub fn request(&self) -> &ProxyRequest {
        &self.request
    }

    pub fn wants_stream(&self) -> bool {
        self.request.wants_stream()
    }

    /// Derive a context carrying a modified copy of the request.
    pub fn with_request(&self, request: ProxyRequest) -> Self {
        CallContext::new(request)
    }
}

// ─────────────────────────────────────────────
// Canonical answer
// ─────────────────────────────────────────────

/// Text payload of a choice (`message` or `delta`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnswerMessage {
    pub role: String,
    pub content: String,
}

impl AnswerMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        AnswerMessage {
            role: ChatRole::Assistant.as_str().to_string(),
            content: content.into(),
        }
    }
}

/// One choice of a canonical answer.
///
/// Single-shot answers fill `message` and `finish_reason`; streamed chunks
/// fill `delta` only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<AnswerMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<AnswerMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// The canonical envelope returned to callers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CanonicalAnswer {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
}

impl CanonicalAnswer {
    /// A streamed chunk carrying `content` as a delta.
    pub fn delta(id: &str, created: i64, model: &str, content: impl Into<String>) -> Self {
        Self::with_choice(
            id,
            created,
            model,
            Choice {
                index: 0,
                message: None,
                delta: Some(AnswerMessage::assistant(content)),
                finish_reason: None,
            },
        )
    }

    /// A complete single-shot answer.
    pub fn message(id: &str, created: i64, model: &str, content: impl Into<String>) -> Self {
        Self::with_choice(
            id,
            created,
            model,
            Choice {
                index: 0,
                message: Some(AnswerMessage::assistant(content)),
                delta: None,
                finish_reason: Some("stop".to_string()),
            },
        )
    }

    fn with_choice(id: &str, created: i64, model: &str, choice: Choice) -> Self {
        CanonicalAnswer {
            id: id.to_string(),
            object: CHUNK_OBJECT.to_string(),
            created,
            model: model.to_string(),
            choices: vec![choice],
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
