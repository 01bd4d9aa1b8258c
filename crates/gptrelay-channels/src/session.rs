//! The chat-session abstraction every backend adapter implements.
//!
//! A session is a process-lifetime, stateless handle on one backend in one
//! mode (single-shot or streaming). Per-call state travels in the
//! [`CallContext`] passed to [`ChatSession::send_chat`].

use std::fmt;

use futures::stream::BoxStream;

use gptrelay_core::{CallContext, ChatMessage, ChatRole, ASSISTANT_ACK};

use crate::error::SessionError;

/// Raw text fragments produced by a backend, in arrival order.
///
/// Cold: nothing is sent upstream until the stream is first polled.
/// Dropping it abandons the upstream exchange.
pub type FragmentStream = BoxStream<'static, Result<String, SessionError>>;

// ─────────────────────────────────────────────
// Channel identity
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamMode {
    Single,
    Stream,
}

impl StreamMode {
    pub fn from_flag(streaming: bool) -> Self {
        if streaming {
            StreamMode::Stream
        } else {
            StreamMode::Single
        }
    }

    pub fn is_stream(self) -> bool {
        self == StreamMode::Stream
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMode::Single => f.write_str("single"),
            StreamMode::Stream => f.write_str("stream"),
        }
    }
}

/// Registry key: a channel name plus the mode it serves.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub name: String,
    pub mode: StreamMode,
}

impl ChannelKey {
    pub fn new(name: impl Into<String>, mode: StreamMode) -> Self {
        ChannelKey {
            name: name.into(),
            mode,
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.mode)
    }
}

/// Static description of a session.
#[derive(Clone, Debug)]
pub struct ChannelProfile {
    name: String,
    native: bool,
    mode: StreamMode,
    weight: u32,
    model: String,
}

impl ChannelProfile {
    /// A non-native, single-shot profile with weight 1.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        ChannelProfile {
            model: name.clone(),
            name,
            native: false,
            mode: StreamMode::Single,
            weight: 1,
        }
    }

    /// Mark the backend as speaking the canonical format, which also means
    /// it understands system messages.
    pub fn native(mut self, native: bool) -> Self {
        self.native = native;
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.mode = StreamMode::from_flag(streaming);
        self
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Label used on re-wrapped answers when the request names no model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn supports_native_system_role(&self) -> bool {
        self.native
    }

    pub fn is_streaming(&self) -> bool {
        self.mode.is_stream()
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn channel_weight(&self) -> u32 {
        self.weight
    }

    pub fn default_model(&self) -> &str {
        &self.model
    }

    pub fn key(&self) -> ChannelKey {
        ChannelKey::new(self.name.clone(), self.mode)
    }
}

// ─────────────────────────────────────────────
// ChatSession
// ─────────────────────────────────────────────

/// One backend adapter.
pub trait ChatSession: Send + Sync {
    fn profile(&self) -> &ChannelProfile;

    /// Start a reply to `question`, given the full (already flattened)
    /// conversation. Single-shot sessions yield at most one fragment.
    ///
    /// Transport failures at request time end the stream early and are
    /// logged by the session; they are not yielded as errors.
    fn send_chat(
        &self,
        ctx: &CallContext,
        question: &str,
        messages: Vec<ChatMessage>,
    ) -> FragmentStream;

    /// Whether the reply is complete once `latest` arrives after
    /// `accumulated`. When true, `latest` is discarded.
    fn is_terminal(&self, _accumulated: &str, _latest: &str) -> bool {
        false
    }
}

/// Rewrite every system message as a user message followed by an
/// assistant acknowledgement, for backends without a system role.
pub fn flatten_roles(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let systems = messages
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .count();
    let mut out = Vec::with_capacity(messages.len() + systems);
    for message in messages {
        if message.role == ChatRole::System {
            out.push(ChatMessage::user(message.content));
            out.push(ChatMessage::assistant(ASSISTANT_ACK));
        } else {
            out.push(message);
        }
    }
    out
}
