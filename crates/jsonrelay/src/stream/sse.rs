//! `text/event-stream` decoding for transport implementors.

use std::collections::VecDeque;

use futures_util::{Stream, StreamExt, stream};

use super::{frame::RawFrame, transport::FrameStream, transport::TransportError};

/// Incremental Server-Sent-Events decoder.
///
/// Bytes may be split anywhere; a line is only interpreted once its `\n`
/// arrives. A blank line ends an event; `:` lines are comments.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes, returning every event they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<RawFrame> {
        let mut frames = Vec::new();
        let mut rest = bytes;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.line.extend_from_slice(&rest[..pos]);
            rest = &rest[pos + 1..];
            let line = std::mem::take(&mut self.line);
            if let Some(frame) = self.feed_line(&String::from_utf8_lossy(&line)) {
                frames.push(frame);
            }
        }
        self.line.extend_from_slice(rest);
        frames
    }

    /// Flushes a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<RawFrame> {
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            if let Some(frame) = self.feed_line(&String::from_utf8_lossy(&line)) {
                return Some(frame);
            }
        }
        self.take_frame()
    }

    fn feed_line(&mut self, line: &str) -> Option<RawFrame> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return self.take_frame();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            "id" => self.id = Some(value.to_owned()),
            _ => {}
        }
        None
    }

    fn take_frame(&mut self) -> Option<RawFrame> {
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        let frame = RawFrame {
            event: self.event.take(),
            data: self.data.join("\n"),
            id: self.id.take(),
        };
        self.data.clear();
        Some(frame)
    }
}

/// Turns a byte stream carrying `text/event-stream` into a [`FrameStream`].
///
/// The first transport error ends the stream after being yielded.
pub fn decode_sse<S, B>(bytes: S) -> FrameStream
where
    S: Stream<Item = Result<B, TransportError>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    struct State<S> {
        bytes: std::pin::Pin<Box<S>>,
        decoder: SseDecoder,
        ready: VecDeque<RawFrame>,
        finished: bool,
    }

    let initial = State {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(initial, |mut st| async move {
        loop {
            if let Some(frame) = st.ready.pop_front() {
                return Some((Ok(frame), st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = st.decoder.feed(chunk.as_ref());
                    st.ready.extend(frames);
                }
                Some(Err(err)) => {
                    st.finished = true;
                    return Some((Err(err), st));
                }
                None => {
                    st.finished = true;
                    st.ready.extend(st.decoder.finish());
                }
            }
        }
    })
    .boxed()
}
