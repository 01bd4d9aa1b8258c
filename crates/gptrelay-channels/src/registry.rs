//! Channel registry and `all` load-balancing.
//!
//! Built once at startup by [`ChannelRegistryBuilder`] and immutable
//! afterwards. The only mutable state is the rotation cursor, an atomic
//! counter owned by the registry.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use gptrelay_core::config::{ChannelConfig, ChannelKind, Config};
use gptrelay_core::GatewayError;
use gptrelay_transport::{dedicated, HttpTransport, TransportBuilder};

use crate::compat::CompatSession;
use crate::error::RegistryError;
use crate::openai::OpenAiSession;
use crate::session::{ChannelKey, ChatSession, StreamMode};

/// Channel name that selects the next backend in rotation.
pub const ALL_CHANNELS: &str = "all";

pub struct ChannelRegistry {
    sessions: HashMap<ChannelKey, Arc<dyn ChatSession>>,
    rotation: Vec<String>,
    cursor: AtomicUsize,
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.channel_names())
            .field("rotation", &self.rotation)
            .finish()
    }
}

impl ChannelRegistry {
    pub fn builder() -> ChannelRegistryBuilder {
        ChannelRegistryBuilder::default()
    }

    /// Find the session serving `name` in the requested mode.
    ///
    /// `all` is first replaced by the next rotation entry; concurrent
    /// callers each take a distinct ticket.
    pub fn resolve(
        &self,
        name: &str,
        streaming: bool,
    ) -> Result<Arc<dyn ChatSession>, GatewayError> {
        let target = if name == ALL_CHANNELS {
            self.next_in_rotation().unwrap_or(ALL_CHANNELS)
        } else {
            name
        };

        let key = ChannelKey::new(target, StreamMode::from_flag(streaming));
        match self.sessions.get(&key) {
            Some(session) => {
                debug!(requested = %name, resolved = %key, "Channel resolved");
                Ok(Arc::clone(session))
            }
            None => Err(GatewayError::ChannelNotFound {
                channel: target.to_string(),
                stream: streaming,
            }),
        }
    }

    /// Take the next rotation ticket. `None` when nothing is in rotation.
    pub fn next_in_rotation(&self) -> Option<&str> {
        if self.rotation.is_empty() {
            return None;
        }
        let ticket = self.cursor.fetch_add(1, Ordering::Relaxed);
        Some(&self.rotation[ticket % self.rotation.len()])
    }

    /// Whether `name` is `all` or any registered channel.
    pub fn is_known(&self, name: &str) -> bool {
        name == ALL_CHANNELS || self.sessions.keys().any(|k| k.name == name)
    }

    /// Flattened rotation: each single-shot channel repeated `weight` times,
    /// in registration order.
    pub fn rotation(&self) -> &[String] {
        &self.rotation
    }

    /// Registered channel names, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        self.sessions
            .keys()
            .map(|k| k.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// One single-shot and one streaming session for every enabled channel
    /// in `config`, all sharing a transport built from `config.transport`.
    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        let transport = dedicated(TransportBuilder::from_config(&config.transport))?;
        let mut builder = Self::builder();
        for channel in config.enabled_channels() {
            if !channel.is_configured() {
                warn!(channel = %channel.name, "Channel has no API key configured");
            }
            builder = builder
                .register(session_for(channel, false, transport.clone()))
                .register(session_for(channel, true, transport.clone()));
        }
        let registry = builder.build()?;
        info!(
            channels = ?registry.channel_names(),
            rotation = registry.rotation().len(),
            "Channel registry ready"
        );
        Ok(registry)
    }
}

/// Adapter for `channel` in the given mode.
pub fn session_for(
    channel: &ChannelConfig,
    streaming: bool,
    transport: HttpTransport,
) -> Arc<dyn ChatSession> {
    match channel.kind {
        ChannelKind::Openai => Arc::new(OpenAiSession::new(channel, streaming, transport)),
        ChannelKind::Compat => Arc::new(CompatSession::new(channel, streaming, transport)),
    }
}

// ─────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────

#[derive(Default)]
pub struct ChannelRegistryBuilder {
    sessions: Vec<Arc<dyn ChatSession>>,
}

impl ChannelRegistryBuilder {
    pub fn register(mut self, session: Arc<dyn ChatSession>) -> Self {
        self.sessions.push(session);
        self
    }

    pub fn build(self) -> Result<ChannelRegistry, RegistryError> {
        let mut sessions = HashMap::with_capacity(self.sessions.len());
        let mut rotation = Vec::new();

        for session in self.sessions {
            let profile = session.profile();
            let name = profile.name().to_string();

            if name == ALL_CHANNELS {
                return Err(RegistryError::ReservedName(name));
            }
            if profile.channel_weight() == 0 {
                return Err(RegistryError::ZeroWeight { channel: name });
            }

            let key = profile.key();
            if sessions.contains_key(&key) {
                return Err(RegistryError::DuplicateChannel {
                    channel: name,
                    mode: key.mode,
                });
            }

            if !profile.is_streaming() {
                for _ in 0..profile.channel_weight() {
                    rotation.push(name.clone());
                }
            }
            sessions.insert(key, session);
        }

        let mut checked = HashSet::new();
        for name in &rotation {
            if checked.insert(name.as_str())
                && !sessions.contains_key(&ChannelKey::new(name.clone(), StreamMode::Stream))
            {
                return Err(RegistryError::MissingStreamingVariant {
                    channel: name.clone(),
                });
            }
        }

        Ok(ChannelRegistry {
            sessions,
            rotation,
            cursor: AtomicUsize::new(0),
        })
    }
}
