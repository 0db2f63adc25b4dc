//! Compilation of path-pattern text into token sequences.
//!
//! The grammar is deliberately small: dot-separated keys, bracketed
//! non-negative indices and a bracketed `*` wildcard. A leading `$` (and a `.`
//! right after it) is accepted and ignored.
//!
//! ```text
//! pattern  := [ "$" [ "." ] ] [ segments ]
//! segments := segment { ( "." key | bracket ) }
//! segment  := key | bracket
//! bracket  := "[" ( digits | "*" ) "]"
//! ```

use std::fmt;

use thiserror::Error;

use crate::path::PathItem;

/// One element of a compiled pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathToken {
    /// Matches an object member with exactly this key.
    Key(String),
    /// Matches an array element with exactly this index.
    Index(usize),
    /// Matches any single key or index.
    Wildcard,
}

impl PathToken {
    /// Whether this token accepts the given path component.
    #[must_use]
    pub fn matches(&self, item: &PathItem) -> bool {
        match (self, item) {
            (PathToken::Wildcard, _) => true,
            (PathToken::Key(k), PathItem::Key(p)) => k.as_str() == &**p,
            (PathToken::Index(i), PathItem::Index(p)) => i == p,
            _ => false,
        }
    }
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathToken::Key(k) => f.write_str(k),
            PathToken::Index(i) => write!(f, "[{i}]"),
            PathToken::Wildcard => f.write_str("[*]"),
        }
    }
}

/// An immutable, validated pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledPattern {
    source: String,
    tokens: Vec<PathToken>,
}

impl CompiledPattern {
    /// The text this pattern was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The tokens in document order (outermost first).
    #[must_use]
    pub fn tokens(&self) -> &[PathToken] {
        &self.tokens
    }

    /// Tail-anchored match.
    ///
    /// A pattern of length *k* matches a path of length *n* iff *n* ≥ *k* and
    /// the last *k* path components are accepted token by token. The empty
    /// pattern matches every path.
    ///
    /// ```rust
    /// use jsonrelay::{compile, path};
    ///
    /// let p = compile("keyPoints[*]").unwrap();
    /// assert!(p.matches(&path!["keyPoints", 0]));
    /// assert!(p.matches(&path!["data", "keyPoints", 4]));
    /// assert!(!p.matches(&path!["keyPoints"]));
    /// ```
    #[must_use]
    pub fn matches(&self, path: &[PathItem]) -> bool {
        if self.tokens.len() > path.len() {
            return false;
        }
        self.tokens
            .iter()
            .rev()
            .zip(path.iter().rev())
            .all(|(token, item)| token.matches(item))
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for CompiledPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        compile(s)
    }
}

/// Raised synchronously when a pattern is registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern text does not follow the key/bracket grammar.
    #[error("invalid path pattern {pattern:?} at offset {offset}: {reason}")]
    InvalidPatternSyntax {
        /// The offending pattern text.
        pattern: String,
        /// Byte offset of the first problem.
        offset: usize,
        /// What was wrong.
        reason: &'static str,
    },
}

/// Compiles pattern text.
///
/// # Errors
///
/// Returns [`PatternError::InvalidPatternSyntax`] for empty segments (`a..b`,
/// a trailing `.`), unterminated or empty brackets, bracket contents that are
/// neither a non-negative integer nor `*`, and anything other than `.` or `[`
/// after a closing `]`.
pub fn compile(text: &str) -> Result<CompiledPattern, PatternError> {
    let tokens = Lexer::new(text).run()?;
    Ok(CompiledPattern {
        source: text.to_owned(),
        tokens,
    })
}

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
    tokens: Vec<PathToken>,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn error(&self, offset: usize, reason: &'static str) -> PatternError {
        PatternError::InvalidPatternSyntax {
            pattern: self.text.to_owned(),
            offset,
            reason,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn run(mut self) -> Result<Vec<PathToken>, PatternError> {
        // A leading `$`, and a `.` right after it, carry no segment.
        if self.peek() == Some(b'$') {
            self.pos += 1;
            if self.peek() == Some(b'.') {
                self.pos += 1;
                if self.peek().is_none() {
                    return Err(self.error(self.pos, "empty segment"));
                }
            }
        }
        if self.peek().is_none() {
            return Ok(self.tokens);
        }

        // First segment: a key or a bracket.
        self.segment()?;
        while let Some(b) = self.peek() {
            match b {
                b'.' => {
                    self.pos += 1;
                    self.key()?;
                }
                b'[' => self.bracket()?,
                _ => return Err(self.error(self.pos, "expected '.' or '['")),
            }
        }
        Ok(self.tokens)
    }

    fn segment(&mut self) -> Result<(), PatternError> {
        if self.peek() == Some(b'[') {
            self.bracket()
        } else {
            self.key()
        }
    }

    fn key(&mut self) -> Result<(), PatternError> {
        let start = self.pos;
        let text = self.text;
        let rest = &text[start..];
        let len = rest.find(['.', '[', ']']).unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error(start, if rest.starts_with(']') {
                "unexpected ']'"
            } else {
                "empty segment"
            }));
        }
        self.tokens.push(PathToken::Key(rest[..len].to_owned()));
        self.pos += len;
        Ok(())
    }

    fn bracket(&mut self) -> Result<(), PatternError> {
        let open = self.pos;
        self.pos += 1;
        let text = self.text;
        let rest = &text[self.pos..];
        let Some(close) = rest.find(']') else {
            return Err(self.error(open, "unterminated '['"));
        };
        let inner = &rest[..close];
        let token = match inner {
            "" => return Err(self.error(open, "empty brackets")),
            "*" => PathToken::Wildcard,
            digits if digits.bytes().all(|b| b.is_ascii_digit()) => digits
                .parse::<usize>()
                .map(PathToken::Index)
                .map_err(|_| self.error(self.pos, "index out of range"))?,
            _ => {
                return Err(self.error(
                    self.pos,
                    "bracket must hold a non-negative integer or '*'",
                ));
            }
        };
        self.tokens.push(token);
        self.pos += close + 1;
        Ok(())
    }
}
