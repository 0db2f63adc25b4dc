use std::{
    any::Any,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
};

use crate::{
    path::{PathItem, display_path},
    pattern::{CompiledPattern, PatternError, compile},
    value::Value,
};

/// Callback invoked with the matched value and the live path it sits at.
pub type MatchCallback = Box<dyn FnMut(&Value, &[PathItem]) + Send>;

/// Ordered list of `(pattern, callback)` registrations.
///
/// Registrations are never de-duplicated: registering the same pattern twice
/// fires twice, in registration order.
#[derive(Default)]
pub struct PathMatcher {
    entries: Vec<(CompiledPattern, MatchCallback)>,
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(p, _)| p.source()))
            .finish()
    }
}

impl PathMatcher {
    /// Creates an empty matcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an already compiled pattern.
    pub fn register<F>(&mut self, pattern: CompiledPattern, callback: F) -> &mut Self
    where
        F: FnMut(&Value, &[PathItem]) + Send + 'static,
    {
        self.entries.push((pattern, Box::new(callback)));
        self
    }

    /// Compiles `pattern` and registers `callback` for it.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidPatternSyntax`] if `pattern` does not
    /// compile; nothing is registered in that case.
    pub fn on<F>(&mut self, pattern: &str, callback: F) -> Result<&mut Self, PatternError>
    where
        F: FnMut(&Value, &[PathItem]) + Send + 'static,
    {
        let compiled = compile(pattern)?;
        Ok(self.register(compiled, callback))
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns whether any registered pattern matches `path`.
    #[must_use]
    pub fn any_match(&self, path: &[PathItem]) -> bool {
        self.entries.iter().any(|(p, _)| p.matches(path))
    }

    /// Invokes every callback whose pattern matches `path`, in registration
    /// order. A panicking callback is logged and skipped; the remaining
    /// callbacks still run.
    pub fn check_patterns(&mut self, path: &[PathItem], value: &Value) {
        for (pattern, callback) in &mut self.entries {
            if !pattern.matches(path) {
                continue;
            }
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(value, path))) {
                tracing::error!(
                    event = "pattern_callback_panicked",
                    pattern = pattern.source(),
                    path = %display_path(path),
                    message = panic_message(panic.as_ref()),
                );
            }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
