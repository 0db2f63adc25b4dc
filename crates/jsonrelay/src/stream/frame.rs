use std::fmt;

/// One frame as delivered by a transport, before classification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawFrame {
    /// Event name; `None` means the default `message` event.
    pub event: Option<String>,
    /// Payload text.
    pub data: String,
    /// Last-event id, if the transport carries one.
    pub id: Option<String>,
}

impl RawFrame {
    /// A frame with an explicit event name.
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
            id: None,
        }
    }

    /// A default `message` frame.
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
            id: None,
        }
    }
}

/// The closed set of event kinds consumers can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `message`, or a frame without an event name.
    Message,
    /// `chunk`: a slice of the JSON document being streamed.
    Chunk,
    /// `done`: the document is complete.
    Done,
    /// `error`: the server reported a failure in-band.
    Error,
    /// `heartbeat` or `ping`: keep-alive with no payload.
    Heartbeat,
    /// Any other event name.
    Unrecognized,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Message,
        Self::Chunk,
        Self::Done,
        Self::Error,
        Self::Heartbeat,
        Self::Unrecognized,
    ];

    /// Classifies an event name.
    #[must_use]
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            None | Some("message") => Self::Message,
            Some("chunk") => Self::Chunk,
            Some("done") => Self::Done,
            Some("error") => Self::Error,
            Some("heartbeat" | "ping") => Self::Heartbeat,
            Some(_) => Self::Unrecognized,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Message => "message",
            Self::Chunk => "chunk",
            Self::Done => "done",
            Self::Error => "error",
            Self::Heartbeat => "heartbeat",
            Self::Unrecognized => "unrecognized",
        })
    }
}

/// Payload of an in-band `error` event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorPayload {
    /// Human-readable message. Falls back to the raw data when the payload is
    /// not a JSON object with a `message` field.
    pub message: String,
    /// Machine-readable code, if the server sent one.
    pub code: Option<String>,
}

impl ErrorPayload {
    /// Decodes `{"message": ..., "code": ...}`; `code` may be a string or a
    /// number.
    #[must_use]
    pub fn parse(data: &str) -> Self {
        let decoded = serde_json::from_str::<serde_json::Value>(data).ok();
        let field = |name: &str| decoded.as_ref().and_then(|v| v.get(name));
        let message = field("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| data.to_owned(), str::to_owned);
        let code = field("code").and_then(|c| match c {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        Self { message, code }
    }
}

/// A classified frame, carrying a payload typed per kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// A plain message.
    Message {
        /// Payload text.
        data: String,
        /// Last-event id.
        id: Option<String>,
    },
    /// A slice of the JSON document.
    Chunk {
        /// Document text.
        data: String,
    },
    /// End of the document.
    Done,
    /// In-band error.
    Error(ErrorPayload),
    /// Keep-alive.
    Heartbeat,
    /// Unknown event name, passed through untouched.
    Unrecognized {
        /// The event name.
        event: String,
        /// Payload text.
        data: String,
    },
}

impl StreamEvent {
    /// The kind used for callback lookup.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message { .. } => EventKind::Message,
            Self::Chunk { .. } => EventKind::Chunk,
            Self::Done => EventKind::Done,
            Self::Error(_) => EventKind::Error,
            Self::Heartbeat => EventKind::Heartbeat,
            Self::Unrecognized { .. } => EventKind::Unrecognized,
        }
    }
}

impl From<RawFrame> for StreamEvent {
    fn from(frame: RawFrame) -> Self {
        match EventKind::from_name(frame.event.as_deref()) {
            EventKind::Message => Self::Message {
                data: frame.data,
                id: frame.id,
            },
            EventKind::Chunk => Self::Chunk { data: frame.data },
            EventKind::Done => Self::Done,
            EventKind::Error => Self::Error(ErrorPayload::parse(&frame.data)),
            EventKind::Heartbeat => Self::Heartbeat,
            EventKind::Unrecognized => Self::Unrecognized {
                event: frame.event.unwrap_or_default(),
                data: frame.data,
            },
        }
    }
}
