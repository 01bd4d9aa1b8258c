//! Backend sessions and routing for gptrelay.
//!
//! A [`ChatSession`] talks to one backend in one mode. The
//! [`ChannelRegistry`] maps `(channel, mode)` to sessions and load-balances
//! `all`. The [`Normalizer`] turns whatever a session yields into canonical
//! output.

pub mod compat;
pub mod error;
pub mod normalizer;
pub mod openai;
pub mod registry;
pub mod request;
pub mod session;
pub mod sse;

pub use compat::{CompatSession, StopMarker};
pub use error::{RegistryError, SessionError};
pub use normalizer::{EnvelopeStream, Normalizer};
pub use openai::OpenAiSession;
pub use registry::{session_for, ChannelRegistry, ChannelRegistryBuilder, ALL_CHANNELS};
pub use session::{flatten_roles, ChannelKey, ChannelProfile, ChatSession, FragmentStream, StreamMode};
