//! One live event stream per session key, shared by many consumers.
//!
//! A [`Multiplexer`] owns the registry of sessions. Each session runs a single
//! worker task that opens the stream through a [`Transport`], dispatches
//! frames to every consumer's [`ConsumerTable`] in order, and reconnects with
//! [`ReconnectPolicy`] backoff when the stream fails.

mod frame;
mod multiplexer;
mod policy;
mod session;
mod sse;
mod transport;

use std::{fmt, sync::Arc};

pub use frame::{ErrorPayload, EventKind, RawFrame, StreamEvent};
pub use multiplexer::{
    Acquired, ConsumerTable, ErrorCallback, EventCallback, LifecycleCallback, Multiplexer,
    RegistrationHandle,
};
pub use policy::{ReconnectPolicy, SessionConfig};
pub use session::{SessionSnapshot, StreamSession};
pub use sse::{SseDecoder, decode_sse};
pub use transport::{FrameStream, Method, StreamRequest, Transport, TransportError};

/// Logical identifier under which at most one live stream exists.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(Arc<str>);

impl SessionKey {
    /// The key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl From<String> for SessionKey {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

/// Lifecycle of one session's connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Opening the stream.
    Connecting,
    /// Stream open and delivering frames.
    Connected,
    /// Stream ended normally, or the session was cancelled.
    Disconnected,
    /// Last attempt failed.
    Error,
}

/// Whether the host application is in front of the user.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Visible; reconnects use the short base delay.
    #[default]
    Foreground,
    /// Hidden; reconnects slow down and may park.
    Background,
}

/// Locks `mutex`, recovering the data if a panicking callback poisoned it.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
