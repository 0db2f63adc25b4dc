//! Binds one stream session to a [`StreamingParser`].

use std::{
    fmt, mem,
    sync::{Arc, Mutex},
};

use crate::{
    error::StreamError,
    matcher::PathMatcher,
    parser::{ParserError, ParserOptions, StreamingParser},
    path::PathItem,
    pattern::PatternError,
    stream::{
        ConsumerTable, ErrorCallback, EventCallback, EventKind, LifecycleCallback, Multiplexer,
        RegistrationHandle, SessionKey, StreamEvent, StreamRequest, lock,
    },
    value::Value,
};

/// Optional callbacks for [`JsonStreamClient::connect`].
#[derive(Clone, Default)]
pub struct ConnectHandlers {
    /// Every frame, after any parsing it triggered.
    pub on_frame: Option<EventCallback>,
    /// The current document ended, by `done` or by the stream closing.
    pub on_close: Option<LifecycleCallback>,
    /// Session failures and the first parse error of each document.
    pub on_error: Option<ErrorCallback>,
}

impl fmt::Debug for ConnectHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectHandlers")
            .field("on_frame", &self.on_frame.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl ConnectHandlers {
    /// No callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `on_frame` callback.
    #[must_use]
    pub fn on_frame(mut self, f: impl Fn(&StreamEvent) + Send + Sync + 'static) -> Self {
        self.on_frame = Some(Arc::new(f));
        self
    }

    /// Sets the `on_close` callback.
    #[must_use]
    pub fn on_close(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(f));
        self
    }

    /// Sets the `on_error` callback.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&StreamError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Document {
    Active,
    Failed,
    Finished,
}

/// What the stream side asks of the handlers after touching the parser.
#[derive(Debug, Default)]
struct Effects {
    error: Option<ParserError>,
    closed: bool,
}

#[derive(Debug)]
struct Binding {
    parser: StreamingParser,
    options: ParserOptions,
    document: Document,
}

impl Binding {
    /// Starts a new document with the same patterns.
    fn reset(&mut self) {
        let matcher = mem::take(self.parser.matcher_mut());
        self.parser = StreamingParser::new(matcher, self.options);
        self.document = Document::Active;
    }

    fn write(&mut self, data: &str) -> Effects {
        if self.document == Document::Finished {
            self.reset();
        }
        if self.document == Document::Failed {
            return Effects::default();
        }
        match self.parser.write(data) {
            Ok(()) => Effects::default(),
            Err(err) => {
                self.document = Document::Failed;
                Effects {
                    error: Some(err),
                    closed: false,
                }
            }
        }
    }

    fn finish(&mut self) -> Effects {
        match self.document {
            Document::Finished => Effects::default(),
            Document::Failed => {
                self.document = Document::Finished;
                Effects {
                    error: None,
                    closed: true,
                }
            }
            Document::Active => {
                self.document = Document::Finished;
                Effects {
                    error: self.parser.end().err(),
                    closed: true,
                }
            }
        }
    }
}

/// Streams one JSON document per session open into pattern callbacks.
///
/// `chunk` frames are parsed; `done` or a normal stream end finishes the
/// document. A `chunk` arriving after the document finished starts a new one.
pub struct JsonStreamClient {
    multiplexer: Multiplexer,
    key: SessionKey,
    binding: Arc<Mutex<Binding>>,
    connection: Option<RegistrationHandle>,
}

impl fmt::Debug for JsonStreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonStreamClient")
            .field("key", &self.key)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl JsonStreamClient {
    /// A client for the session `key`, parsing with `options`. Nothing is
    /// opened until [`connect`](Self::connect).
    #[must_use]
    pub fn new(
        multiplexer: Multiplexer,
        key: impl Into<SessionKey>,
        options: ParserOptions,
    ) -> Self {
        Self {
            multiplexer,
            key: key.into(),
            binding: Arc::new(Mutex::new(Binding {
                parser: StreamingParser::new(PathMatcher::new(), options),
                options,
                document: Document::Active,
            })),
            connection: None,
        }
    }

    /// The session key.
    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Whether `connect` succeeded and `disconnect` has not been called since.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Registers `callback` for values whose path matches `pattern`.
    ///
    /// # Errors
    ///
    /// [`PatternError::InvalidPatternSyntax`] when `pattern` does not compile.
    pub fn on<F>(&mut self, pattern: &str, callback: F) -> Result<&mut Self, PatternError>
    where
        F: FnMut(&Value, &[PathItem]) + Send + 'static,
    {
        lock(&self.binding).parser.matcher_mut().on(pattern, callback)?;
        Ok(self)
    }

    /// Calls `f` with the completed document, when one is materialized.
    pub fn with_root<R>(&self, f: impl FnOnce(Option<&Value>) -> R) -> R {
        f(lock(&self.binding).parser.root())
    }

    /// Joins the session for this client's key and starts parsing.
    ///
    /// # Errors
    ///
    /// [`StreamError::AlreadyConnected`] on a second call without
    /// [`disconnect`](Self::disconnect); [`StreamError::NoRuntime`] outside a
    /// Tokio runtime.
    pub fn connect(
        &mut self,
        request: StreamRequest,
        handlers: ConnectHandlers,
    ) -> Result<(), StreamError> {
        if self.connection.is_some() {
            return Err(StreamError::AlreadyConnected);
        }
        let table = consumer_table(&self.binding, &handlers);
        let acquired = self
            .multiplexer
            .acquire_with(self.key.clone(), request, table)?;
        tracing::debug!(event = "client_connected", session = %self.key);
        self.connection = Some(acquired.handle);
        Ok(())
    }

    /// Releases this client's registration. A no-op when not connected.
    ///
    /// # Errors
    ///
    /// Propagates [`Multiplexer::release`] failures.
    pub fn disconnect(&mut self) -> Result<(), StreamError> {
        let Some(handle) = self.connection.take() else {
            return Ok(());
        };
        tracing::debug!(event = "client_disconnected", session = %self.key);
        self.multiplexer.release(&self.key, handle)
    }
}

impl Drop for JsonStreamClient {
    fn drop(&mut self) {
        if let Err(err) = self.disconnect() {
            tracing::debug!(event = "client_release_failed", session = %self.key, error = %err);
        }
    }
}

fn consumer_table(binding: &Arc<Mutex<Binding>>, handlers: &ConnectHandlers) -> ConsumerTable {
    let mut table = ConsumerTable::new();

    for kind in EventKind::ALL {
        let binding = Arc::clone(binding);
        let handlers = handlers.clone();
        table.set(
            kind,
            Arc::new(move |event: &StreamEvent| {
                let effects = match event {
                    StreamEvent::Chunk { data } => lock(&binding).write(data),
                    StreamEvent::Done => lock(&binding).finish(),
                    _ => Effects::default(),
                };
                apply(&handlers, effects);
                if let Some(on_frame) = &handlers.on_frame {
                    on_frame(event);
                }
            }),
        );
    }

    let open_binding = Arc::clone(binding);
    let close_binding = Arc::clone(binding);
    let close_handlers = handlers.clone();
    let error_handler = handlers.on_error.clone();

    table
        .on_open(move || lock(&open_binding).reset())
        .on_close(move || {
            let effects = lock(&close_binding).finish();
            apply(&close_handlers, effects);
        })
        .on_error(move |err| {
            if let Some(on_error) = &error_handler {
                on_error(err);
            }
        })
}

fn apply(handlers: &ConnectHandlers, effects: Effects) {
    if let Some(err) = effects.error {
        tracing::debug!(event = "document_parse_failed", error = %err);
        if let Some(on_error) = &handlers.on_error {
            on_error(&StreamError::Parse(err));
        }
    }
    if effects.closed {
        if let Some(on_close) = &handlers.on_close {
            on_close();
        }
    }
}
