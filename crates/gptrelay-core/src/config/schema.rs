//! Configuration schema.
//!
//! Hierarchy: `Config` → `ServerConfig`, `AuthConfig`, `LogConfig`,
//! `TransportConfig`, `Vec<ChannelConfig>`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration: loaded from `~/.gptrelay/config.json` + env vars.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub log: LogConfig,
    pub transport: TransportConfig,
    pub channels: Vec<ChannelConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            log: LogConfig::default(),
            transport: TransportConfig::default(),
            channels: vec![ChannelConfig::default()],
        }
    }
}

impl Config {
    /// Enabled channels, in declaration order.
    pub fn enabled_channels(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.iter().filter(|c| c.enabled)
    }

    /// Look up a channel by name (case-sensitive).
    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.name == name)
    }
}

// ─────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────

/// Listen address and inbound limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest JSON body the interceptor will buffer.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

// ─────────────────────────────────────────────
// Auth & logging
// ─────────────────────────────────────────────

/// Shared-secret check on the `Authorization` header.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    /// Substring the `Authorization` header must contain (case-insensitive).
    pub secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: "whoami".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogConfig {
    /// Log forwarded questions and completed answers at info level.
    pub print_answers: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            print_answers: true,
        }
    }
}

// ─────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────

/// Which HTTP version the outbound client should speak.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HttpVersionPref {
    /// Negotiate via ALPN.
    #[default]
    Auto,
    Http1,
    /// HTTP/2 with prior knowledge.
    Http2,
}

/// Outbound HTTP client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportConfig {
    pub connect_timeout_secs: u64,
    /// Whole-request timeout. `None` leaves streamed replies unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    pub http_version: HttpVersionPref,
    /// Forward proxy URL, e.g. `http://127.0.0.1:7890`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Accept invalid TLS certificates and host names. Only for
    /// self-hosted backends that cannot present a trusted certificate.
    pub insecure_tls: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: None,
            http_version: HttpVersionPref::Auto,
            proxy: None,
            insecure_tls: false,
        }
    }
}

// ─────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────

/// Protocol family of a backend.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Speaks the canonical format natively; replies pass through untouched.
    #[default]
    Openai,
    /// Chat-completions-like API whose answers are extracted and re-wrapped.
    Compat,
}

/// One upstream backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelConfig {
    /// Name callers use in `X-Channel` (and in `/name` commands).
    pub name: String,
    pub kind: ChannelKind,
    pub enabled: bool,
    pub base_url: String,
    /// Path appended to `base_url`.
    pub path: String,
    pub api_key: String,
    /// Model used when the request carries none; also the label on
    /// re-wrapped answers.
    pub model: String,
    /// Share of `all` traffic. Must be at least 1.
    pub weight: u32,
    /// JSON pointer to the answer text in a single-shot reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_pointer: Option<String>,
    /// JSON pointer to the text in each streamed event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_pointer: Option<String>,
    /// Text that, once seen in the accumulated reply, ends the stream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_marker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: "openai".to_string(),
            kind: ChannelKind::Openai,
            enabled: true,
            base_url: "https://api.openai.com".to_string(),
            path: "/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            weight: 1,
            answer_pointer: None,
            delta_pointer: None,
            stop_marker: None,
            extra_headers: None,
        }
    }
}

impl ChannelConfig {
    /// Whether this channel has an API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Full endpoint URL (`base_url` + `path`), tolerant of stray slashes.
    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.path.is_empty() {
            return base.to_string();
        }
        format!("{}/{}", base, self.path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_openai_channel() {
        let config = Config::default();
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.channels[0].name, "openai");
        assert_eq!(config.channels[0].kind, ChannelKind::Openai);
        assert_eq!(config.auth.secret, "whoami");
    }

    #[test]
    fn test_endpoint_joins_slashes() {
        let mut ch = ChannelConfig::default();
        ch.base_url = "https://api.example.com/".into();
        ch.path = "/v1/chat/completions".into();
        assert_eq!(ch.endpoint(), "https://api.example.com/v1/chat/completions");

        ch.path = "chat".into();
        assert_eq!(ch.endpoint(), "https://api.example.com/chat");

        ch.path = String::new();
        assert_eq!(ch.endpoint(), "https://api.example.com");
    }

    #[test]
    fn test_enabled_channels_filter() {
        let mut config = Config::default();
        config.channels.push(ChannelConfig {
            name: "kimi".into(),
            enabled: false,
            ..Default::default()
        });
        let names: Vec<_> = config.enabled_channels().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["openai"]);
        assert!(config.channel("kimi").is_some());
    }

    #[test]
    fn test_channel_kind_serde() {
        let json = serde_json::to_string(&ChannelKind::Compat).unwrap();
        assert_eq!(json, "\"compat\"");
        let pref: HttpVersionPref = serde_json::from_str("\"http1\"").unwrap();
        assert_eq!(pref, HttpVersionPref::Http1);
    }
}
