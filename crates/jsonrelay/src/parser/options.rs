/// Configuration for [`StreamingParser`](super::StreamingParser).
///
/// # Default
///
/// All options default to `false`.
#[cfg_attr(any(test, feature = "serde"), derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(any(test, feature = "serde"), serde(default))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserOptions {
    /// Fire string callbacks on every appended character.
    ///
    /// When `true`, a string in value position reports its accumulated prefix
    /// after each decoded character, and once more when it closes. When
    /// `false`, strings fire only on close.
    pub realtime: bool,

    /// Materialize containers and fire their full value on close.
    ///
    /// Without this, containers are reported once, empty, when they open. With
    /// it, they are additionally reported complete when they close, and
    /// [`StreamingParser::root`](super::StreamingParser::root) returns the
    /// document.
    pub emit_completed_containers: bool,

    /// Whether to allow any Unicode whitespace between tokens.
    ///
    /// By default only the four whitespace characters JSON defines are
    /// accepted: space, line feed, carriage return and horizontal tab.
    pub allow_unicode_whitespace: bool,

    #[cfg(any(test, feature = "fuzzing"))]
    #[cfg_attr(any(test, feature = "serde"), serde(skip))]
    /// Panic on syntax errors instead of returning them.
    ///
    /// Only available in test and fuzzing builds, to get a backtrace at the
    /// failing character.
    pub panic_on_error: bool,
}
