use thiserror::Error;

use super::State;

/// A fatal parse failure, tagged with the 1-based line and column of the
/// offending character.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{source} at {line}:{column}")]
pub struct ParserError {
    /// What went wrong.
    pub source: SyntaxError,
    /// 1-based line.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
}

/// The kinds of syntax errors the parser reports.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyntaxError {
    /// A character that the current state cannot accept.
    #[error("unexpected character {ch:?} in state {state}")]
    UnexpectedCharacter {
        /// State the parser was in.
        state: State,
        /// The rejected character.
        ch: char,
    },
    /// Input ended before the root value completed.
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
    /// Number text that does not form a valid JSON number.
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    /// A non-hex digit inside `\u` escape.
    #[error("invalid unicode escape sequence at character: {0:?}")]
    InvalidUnicodeEscapeChar(char),
    /// A `\u` escape that does not denote a scalar value (e.g. a lone
    /// surrogate).
    #[error("invalid unicode escape sequence \\u{0:04X}")]
    InvalidUnicodeEscapeSequence(u32),
}
