//! Incremental, character-at-a-time JSON parser with path dispatch.
//!
//! [`StreamingParser`] consumes a single JSON document in arbitrary chunks and
//! reports `(path, value)` commit events to a [`PathMatcher`]:
//!
//! - primitives when they are final (string close, number boundary, literal
//!   completion);
//! - containers, empty, when they open (and in full on close with
//!   [`ParserOptions::emit_completed_containers`]);
//! - in realtime mode, the prefix of a value string after every character.
//!
//! The parser never recovers from a syntax error: the first error is stored
//! and returned from every later call.

mod containers;
mod error;
mod escape_buffer;
mod options;
mod utf8;


use std::{fmt, sync::Arc};

use containers::{ContainerKind, ContainerStack};
pub use error::{ParserError, SyntaxError};
use escape_buffer::{SurrogatePair, UnicodeEscapeBuffer};
pub use options::ParserOptions;
use utf8::Utf8Carry;

use crate::{
    matcher::PathMatcher,
    path::{Path, PathItem},
    value::{Array, Map, Value},
};

/// The state that decides how the next character is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Expecting any value.
    Value,
    /// Just after `{`: a key or `}`.
    KeyOrEnd,
    /// After `,` in an object: a key.
    Key,
    /// After a key: `:`.
    Colon,
    /// After a value: `,` or a closer. At depth zero only whitespace.
    Comma,
    /// Just after `[`: a value or `]`.
    ValueOrEnd,
    /// Inside a number.
    Number,
    /// Read `t`.
    True1,
    /// Read `tr`.
    True2,
    /// Read `tru`.
    True3,
    /// Read `f`.
    False1,
    /// Read `fa`.
    False2,
    /// Read `fal`.
    False3,
    /// Read `fals`.
    False4,
    /// Read `n`.
    Null1,
    /// Read `nu`.
    Null2,
    /// Read `nul`.
    Null3,
    /// Inside an object key.
    KeyString,
    /// Inside a string value.
    String,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Consumed,
    /// The state changed without consuming; feed the same character again.
    Redispatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringTarget {
    Key,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    Backslash,
    Unicode,
}

/// A push parser for one JSON document.
///
/// ```rust
/// use std::sync::{Arc, Mutex};
///
/// use jsonrelay::{ParserOptions, PathMatcher, StreamingParser, display_path};
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
///
/// let mut matcher = PathMatcher::new();
/// matcher
///     .on("title", move |value, path| {
///         sink.lock().unwrap().push(format!("{} {value}", display_path(path)));
///     })
///     .unwrap();
///
/// let mut parser = StreamingParser::new(
///     matcher,
///     ParserOptions { realtime: true, ..Default::default() },
/// );
/// for ch in r#"{"title":"ab"}"#.chars() {
///     parser.write(&ch.to_string()).unwrap();
/// }
/// parser.end().unwrap();
///
/// assert_eq!(
///     *seen.lock().unwrap(),
///     vec![r#"$.title "a""#, r#"$.title "ab""#, r#"$.title "ab""#]
/// );
/// ```
#[derive(Debug)]
pub struct StreamingParser {
    matcher: PathMatcher,
    options: ParserOptions,

    state: State,
    escape: Escape,
    unicode: UnicodeEscapeBuffer,
    surrogate: SurrogatePair,
    /// Text of the string or number being read.
    buffer: String,
    pending_key: Option<Arc<str>>,

    path: Path,
    containers: ContainerStack,
    root_done: bool,

    utf8: Utf8Carry,
    line: usize,
    column: usize,
    error: Option<ParserError>,
}

impl StreamingParser {
    /// Creates a parser that dispatches to `matcher`.
    #[must_use]
    pub fn new(matcher: PathMatcher, options: ParserOptions) -> Self {
        Self {
            matcher,
            options,
            state: State::Value,
            escape: Escape::None,
            unicode: UnicodeEscapeBuffer::new(),
            surrogate: SurrogatePair::default(),
            buffer: String::new(),
            pending_key: None,
            path: Path::new(),
            containers: ContainerStack::new(options.emit_completed_containers),
            root_done: false,
            utf8: Utf8Carry::default(),
            line: 1,
            column: 1,
            error: None,
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// The live path of the value being read.
    #[must_use]
    pub fn path(&self) -> &[PathItem] {
        &self.path
    }

    /// The matcher, e.g. to register more patterns mid-document.
    pub fn matcher_mut(&mut self) -> &mut PathMatcher {
        &mut self.matcher
    }

    /// Consumes the parser, returning its matcher.
    #[must_use]
    pub fn into_matcher(self) -> PathMatcher {
        self.matcher
    }

    /// The completed document.
    ///
    /// Primitive roots are always available once read. Container roots are
    /// only materialized with [`ParserOptions::emit_completed_containers`].
    #[must_use]
    pub fn root(&self) -> Option<&Value> {
        self.containers.root()
    }

    /// Feeds a chunk of text.
    ///
    /// # Errors
    ///
    /// Returns the first syntax error encountered, and the same error on every
    /// later call.
    pub fn write(&mut self, chunk: &str) -> Result<(), ParserError> {
        self.check_poisoned()?;
        self.flush_utf8()?;
        for c in chunk.chars() {
            self.feed_char(c)?;
        }
        Ok(())
    }

    /// Feeds raw bytes. A UTF-8 sequence split across calls is held until it
    /// completes; invalid sequences decode to U+FFFD.
    ///
    /// # Errors
    ///
    /// As for [`write`](Self::write).
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ParserError> {
        self.check_poisoned()?;
        let mut carry = std::mem::take(&mut self.utf8);
        let result = carry.decode(bytes, |c| self.feed_char(c));
        self.utf8 = carry;
        result
    }

    /// Signals end of input.
    ///
    /// A number at the root is finished here, since nothing else can delimit
    /// it.
    ///
    /// # Errors
    ///
    /// [`SyntaxError::UnexpectedEndOfInput`] unless exactly one root value has
    /// been fully read; any stored error otherwise.
    pub fn end(&mut self) -> Result<(), ParserError> {
        self.check_poisoned()?;
        self.flush_utf8()?;
        if self.state == State::Number {
            if let Err(source) = self.finish_number() {
                return Err(self.fail(source));
            }
        }
        if !self.root_done {
            return Err(self.fail(SyntaxError::UnexpectedEndOfInput));
        }
        Ok(())
    }

    fn check_poisoned(&self) -> Result<(), ParserError> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn flush_utf8(&mut self) -> Result<(), ParserError> {
        let mut carry = std::mem::take(&mut self.utf8);
        let result = carry.finish(|c| self.feed_char(c));
        self.utf8 = carry;
        result
    }

    fn fail(&mut self, source: SyntaxError) -> ParserError {
        let err = ParserError {
            source,
            line: self.line,
            column: self.column,
        };

        #[cfg(any(test, feature = "fuzzing"))]
        if self.options.panic_on_error {
            panic!("{err}");
        }

        tracing::debug!(
            event = "parse_failed",
            line = err.line,
            column = err.column,
            error = %err.source,
        );
        self.error = Some(err.clone());
        err
    }

    fn feed_char(&mut self, c: char) -> Result<(), ParserError> {
        loop {
            match self.step(c) {
                Ok(Step::Consumed) => break,
                Ok(Step::Redispatch) => {}
                Err(source) => return Err(self.fail(source)),
            }
        }
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Ok(())
    }

    fn is_whitespace(&self, c: char) -> bool {
        matches!(c, ' ' | '\t' | '\n' | '\r')
            || (self.options.allow_unicode_whitespace && c.is_whitespace())
    }

    fn unexpected(&self, ch: char) -> SyntaxError {
        SyntaxError::UnexpectedCharacter {
            state: self.state,
            ch,
        }
    }

    fn step(&mut self, c: char) -> Result<Step, SyntaxError> {
        match self.state {
            State::Value => self.value_char(c),
            State::ValueOrEnd => {
                if self.is_whitespace(c) {
                    Ok(Step::Consumed)
                } else if c == ']' {
                    self.path.pop();
                    self.close_container()?;
                    Ok(Step::Consumed)
                } else {
                    self.state = State::Value;
                    Ok(Step::Redispatch)
                }
            }
            State::KeyOrEnd => match c {
                '"' => self.begin_string(StringTarget::Key),
                // An empty object never pushed a member key.
                '}' => self.close_container(),
                c if self.is_whitespace(c) => Ok(()),
                c => Err(self.unexpected(c)),
            }
            .map(|()| Step::Consumed),
            State::Key => match c {
                '"' => self.begin_string(StringTarget::Key),
                c if self.is_whitespace(c) => Ok(()),
                c => Err(self.unexpected(c)),
            }
            .map(|()| Step::Consumed),
            State::Colon => match c {
                ':' => {
                    let key = self.pending_key.take().unwrap_or_else(|| Arc::from(""));
                    self.path.push(PathItem::Key(key));
                    self.state = State::Value;
                    Ok(Step::Consumed)
                }
                c if self.is_whitespace(c) => Ok(Step::Consumed),
                c => Err(self.unexpected(c)),
            },
            State::Comma => self.comma_char(c).map(|()| Step::Consumed),
            State::Number => {
                if matches!(c, '0'..='9' | '.' | 'e' | 'E' | '+' | '-') {
                    self.buffer.push(c);
                    Ok(Step::Consumed)
                } else {
                    self.finish_number()?;
                    Ok(Step::Redispatch)
                }
            }
            State::True1 => self.literal(c, 'r', State::True2, None),
            State::True2 => self.literal(c, 'u', State::True3, None),
            State::True3 => self.literal(c, 'e', State::Comma, Some(Value::Boolean(true))),
            State::False1 => self.literal(c, 'a', State::False2, None),
            State::False2 => self.literal(c, 'l', State::False3, None),
            State::False3 => self.literal(c, 's', State::False4, None),
            State::False4 => self.literal(c, 'e', State::Comma, Some(Value::Boolean(false))),
            State::Null1 => self.literal(c, 'u', State::Null2, None),
            State::Null2 => self.literal(c, 'l', State::Null3, None),
            State::Null3 => self.literal(c, 'l', State::Comma, Some(Value::Null)),
            State::KeyString => self
                .string_char(StringTarget::Key, c)
                .map(|()| Step::Consumed),
            State::String => self
                .string_char(StringTarget::Value, c)
                .map(|()| Step::Consumed),
        }
    }

    fn value_char(&mut self, c: char) -> Result<Step, SyntaxError> {
        match c {
            '{' => {
                self.matcher
                    .check_patterns(&self.path, &Value::Object(Map::new()));
                self.containers.open(ContainerKind::Object);
                self.state = State::KeyOrEnd;
            }
            '[' => {
                self.matcher
                    .check_patterns(&self.path, &Value::Array(Array::new()));
                self.containers.open(ContainerKind::Array);
                self.path.push(PathItem::Index(0));
                self.state = State::ValueOrEnd;
            }
            '"' => self.begin_string(StringTarget::Value)?,
            't' => self.state = State::True1,
            'f' => self.state = State::False1,
            'n' => self.state = State::Null1,
            '-' | '0'..='9' => {
                self.buffer.clear();
                self.buffer.push(c);
                self.state = State::Number;
            }
            c if self.is_whitespace(c) => {}
            c => return Err(self.unexpected(c)),
        }
        Ok(Step::Consumed)
    }

    fn comma_char(&mut self, c: char) -> Result<(), SyntaxError> {
        if self.is_whitespace(c) {
            return Ok(());
        }
        match (c, self.containers.top()) {
            (',', Some(ContainerKind::Array)) => {
                if let Some(PathItem::Index(i)) = self.path.last_mut() {
                    *i += 1;
                }
                self.state = State::Value;
                Ok(())
            }
            (',', Some(ContainerKind::Object)) => {
                self.path.pop();
                self.state = State::Key;
                Ok(())
            }
            ('}', Some(ContainerKind::Object)) | (']', Some(ContainerKind::Array)) => {
                self.path.pop();
                self.close_container()
            }
            (c, _) => Err(self.unexpected(c)),
        }
    }

    fn literal(
        &mut self,
        c: char,
        expected: char,
        next: State,
        done: Option<Value>,
    ) -> Result<Step, SyntaxError> {
        if c != expected {
            return Err(self.unexpected(c));
        }
        match done {
            Some(value) => self.commit(value),
            None => self.state = next,
        }
        Ok(Step::Consumed)
    }

    fn begin_string(&mut self, target: StringTarget) -> Result<(), SyntaxError> {
        self.state = match target {
            StringTarget::Key => State::KeyString,
            StringTarget::Value => State::String,
        };
        self.escape = Escape::None;
        self.buffer.clear();
        Ok(())
    }

    fn string_char(&mut self, target: StringTarget, c: char) -> Result<(), SyntaxError> {
        match self.escape {
            Escape::Unicode => {
                if let Some(unit) = self.unicode.feed(c)? {
                    self.escape = Escape::None;
                    if let Some(ch) = self.surrogate.push(unit)? {
                        self.append(target, ch);
                    }
                }
                return Ok(());
            }
            Escape::Backslash => {
                let decoded = match c {
                    'u' => {
                        self.escape = Escape::Unicode;
                        self.unicode.reset();
                        return Ok(());
                    }
                    '"' => '"',
                    '\\' => '\\',
                    '/' => '/',
                    'b' => '\u{8}',
                    'f' => '\u{c}',
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    c => return Err(self.unexpected(c)),
                };
                self.surrogate.interrupt()?;
                self.escape = Escape::None;
                self.append(target, decoded);
                return Ok(());
            }
            Escape::None => {}
        }

        match c {
            '\\' => self.escape = Escape::Backslash,
            '"' => {
                self.surrogate.interrupt()?;
                let text = std::mem::take(&mut self.buffer);
                match target {
                    StringTarget::Key => {
                        self.pending_key = Some(Arc::from(text));
                        self.state = State::Colon;
                    }
                    StringTarget::Value => self.commit(Value::String(text)),
                }
            }
            c if (c as u32) < 0x20 => return Err(self.unexpected(c)),
            c => {
                self.surrogate.interrupt()?;
                self.append(target, c);
            }
        }
        Ok(())
    }

    fn append(&mut self, target: StringTarget, c: char) {
        self.buffer.push(c);
        if self.options.realtime
            && target == StringTarget::Value
            && self.matcher.any_match(&self.path)
        {
            let partial = Value::String(self.buffer.clone());
            self.matcher.check_patterns(&self.path, &partial);
        }
    }

    fn finish_number(&mut self) -> Result<(), SyntaxError> {
        let text = std::mem::take(&mut self.buffer);
        let value = parse_number(&text)?;
        self.commit(Value::Number(value));
        Ok(())
    }

    /// Reports a finished primitive at the current path.
    fn commit(&mut self, value: Value) {
        self.matcher.check_patterns(&self.path, &value);
        self.containers.insert(self.path.last(), value);
        if self.containers.depth() == 0 {
            self.root_done = true;
        }
        self.state = State::Comma;
    }

    /// Pops the innermost container. Its own path entry must already be gone.
    fn close_container(&mut self) -> Result<(), SyntaxError> {
        if let Some(full) = self.containers.close() {
            self.matcher.check_patterns(&self.path, &full);
            self.containers.insert(self.path.last(), full);
        }
        if self.containers.depth() == 0 {
            self.root_done = true;
        }
        self.state = State::Comma;
        Ok(())
    }
}

/// Parses number text, enforcing the JSON grammar
/// `-? (0 | [1-9][0-9]*) (\.[0-9]+)? ([eE][+-]?[0-9]+)?`.
fn parse_number(text: &str) -> Result<f64, SyntaxError> {
    let invalid = || SyntaxError::InvalidNumber(text.to_owned());
    let bytes = text.as_bytes();
    let mut i = 0;
    let digits = |i: &mut usize| {
        let start = *i;
        while bytes.get(*i).is_some_and(u8::is_ascii_digit) {
            *i += 1;
        }
        *i - start
    };

    if bytes.first() == Some(&b'-') {
        i += 1;
    }
    let int_start = i;
    match digits(&mut i) {
        0 => return Err(invalid()),
        n if n > 1 && bytes[int_start] == b'0' => return Err(invalid()),
        _ => {}
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        if digits(&mut i) == 0 {
            return Err(invalid());
        }
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        if digits(&mut i) == 0 {
            return Err(invalid());
        }
    }
    if i != bytes.len() {
        return Err(invalid());
    }
    // Out-of-range magnitudes saturate to infinity.
    text.parse::<f64>().map_err(|_| invalid())
}
