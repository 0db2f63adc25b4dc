use thiserror::Error;

use crate::{
    parser::ParserError,
    pattern::PatternError,
    stream::{SessionKey, TransportError},
};

/// Errors surfaced by sessions, the multiplexer and the client.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StreamError {
    /// The transport failed; the session may retry.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Credentials were rejected; the session stopped for good.
    #[error("authentication expired")]
    AuthExpired,
    /// The retry budget ran out.
    #[error("gave up after {attempts} reconnect attempts")]
    MaxRetriesExceeded {
        /// Attempts made in this incident.
        attempts: u32,
    },
    /// The streamed document is not valid JSON.
    #[error("parse error: {0}")]
    Parse(#[from] ParserError),
    /// A pattern failed to compile.
    #[error(transparent)]
    Pattern(#[from] PatternError),
    /// No Tokio runtime is available to drive the session.
    #[error("no tokio runtime available to drive the session")]
    NoRuntime,
    /// `connect` was called twice without `disconnect`.
    #[error("client is already connected")]
    AlreadyConnected,
    /// No live session exists for the key.
    #[error("no session for key {0}")]
    UnknownSession(SessionKey),
    /// The handle is not registered with the session.
    #[error("unknown registration handle")]
    UnknownRegistration,
}
