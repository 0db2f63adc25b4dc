//! Streaming JSON path dispatch over multiplexed, reconnecting event streams.
//!
//! The crate has two halves:
//!
//! - [`StreamingParser`] consumes one JSON document a chunk at a time and
//!   invokes callbacks registered against tail-anchored path patterns
//!   (`"keyPoints[*]"`, `"$.user.name"`) as soon as the matching value is
//!   known. In realtime mode a growing string fires on every appended
//!   character.
//! - [`Multiplexer`] keeps one live stream per session key, shared by any
//!   number of consumers, and reconnects with bounded backoff.
//!   [`JsonStreamClient`] glues a session to a parser.
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use jsonrelay::{ParserOptions, PathMatcher, StreamingParser, Value};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//!
//! let mut matcher = PathMatcher::new();
//! matcher
//!     .on("keyPoints[*]", move |value, _path| {
//!         sink.lock().unwrap().push(value.clone());
//!     })
//!     .unwrap();
//!
//! let mut parser = StreamingParser::new(matcher, ParserOptions::default());
//! parser.write(r#"{"keyPoints": ["a", "#).unwrap();
//! parser.write(r#""b"]}"#).unwrap();
//! parser.end().unwrap();
//!
//! assert_eq!(
//!     *seen.lock().unwrap(),
//!     vec![Value::String("a".into()), Value::String("b".into())]
//! );
//! ```

mod chunk_utils;
mod client;
mod error;
mod matcher;
mod parser;
mod path;
mod pattern;
mod value;

pub mod stream;

#[cfg(test)]
mod tests;

pub use chunk_utils::{produce_chunks, produce_prefixes};
pub use client::{ConnectHandlers, JsonStreamClient};
pub use error::StreamError;
pub use matcher::{MatchCallback, PathMatcher};
pub use parser::{ParserError, ParserOptions, State, StreamingParser, SyntaxError};
pub use path::{Path, PathItem, PathItemFrom, display_path};
pub use pattern::{CompiledPattern, PathToken, PatternError, compile};
pub use stream::{
    ConnectionState, Multiplexer, SessionConfig, SessionKey, StreamEvent, StreamRequest,
    Visibility,
};
pub use value::{Array, Map, Value};

#[doc(hidden)]
pub use std::vec;

/// Builds a [`Path`] from a heterogeneous list of keys and indices.
///
/// ```rust
/// use jsonrelay::{path, PathItem};
///
/// let p = path![0, "foo", 2];
/// assert_eq!(
///     p,
///     vec![
///         PathItem::Index(0),
///         PathItem::Key("foo".into()),
///         PathItem::Index(2)
///     ]
/// );
/// ```
#[macro_export]
macro_rules! path {
    ( $( $elem:expr ),* $(,)? ) => {{
        #[allow(unused_imports)]
        use $crate::PathItemFrom;
        let p: $crate::Path = $crate::vec![$($crate::PathItem::from_path_component($elem)),*];
        p
    }};
}
