#![allow(dead_code)]

use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use futures_util::{
    FutureExt, Stream, StreamExt,
    future::BoxFuture,
    stream::{self, BoxStream},
};
use jsonrelay::{
    Multiplexer, SessionConfig, StreamError,
    stream::{FrameStream, RawFrame, StreamRequest, Transport, TransportError},
};

/// What one `open` call produces.
#[derive(Clone, Debug)]
pub enum Script {
    /// `open` fails.
    Fail(TransportError),
    /// The stream yields these items, then ends.
    Frames(Vec<Result<RawFrame, TransportError>>),
    /// The stream yields these frames, then stays open.
    Hold(Vec<RawFrame>),
}

pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    requests: Mutex<Vec<StreamRequest>>,
    drops: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(scripts: impl IntoIterator<Item = Script>, fallback: Script) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            fallback,
            requests: Mutex::new(Vec::new()),
            drops: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Every open succeeds and stays open.
    pub fn holding() -> Arc<Self> {
        Self::new([], Script::Hold(Vec::new()))
    }

    /// Every open fails.
    pub fn failing() -> Arc<Self> {
        Self::new([], Script::Fail(TransportError::Connect("refused".into())))
    }

    pub fn opens(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Streams dropped by their session.
    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

struct Tracked {
    inner: BoxStream<'static, Result<RawFrame, TransportError>>,
    drops: Arc<AtomicUsize>,
}

impl Stream for Tracked {
    type Item = Result<RawFrame, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, request: &StreamRequest) -> BoxFuture<'static, Result<FrameStream, TransportError>> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let drops = Arc::clone(&self.drops);

        async move {
            let inner = match script {
                Script::Fail(err) => return Err(err),
                Script::Frames(items) => stream::iter(items).boxed(),
                Script::Hold(frames) => stream::iter(frames.into_iter().map(Ok))
                    .chain(stream::pending())
                    .boxed(),
            };
            Ok(Tracked { inner, drops }.boxed())
        }
        .boxed()
    }
}

pub fn multiplexer(transport: &Arc<ScriptedTransport>, config: SessionConfig) -> Multiplexer {
    let transport: Arc<dyn Transport> = transport.clone();
    Multiplexer::with_config(transport, config)
}

pub fn message(data: &str) -> RawFrame {
    RawFrame::message(data)
}

pub fn chunk(data: &str) -> RawFrame {
    RawFrame::new("chunk", data)
}

pub fn done() -> RawFrame {
    RawFrame::new("done", "")
}

/// Lets spawned workers run without advancing the paused clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub async fn advance(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    settle().await;
}

pub type Recorder<T> = Arc<Mutex<Vec<T>>>;

pub fn recorder<T>() -> Recorder<T> {
    Arc::new(Mutex::new(Vec::new()))
}

/// Error callback appending to `log`.
pub fn record_errors(log: &Recorder<StreamError>) -> impl Fn(&StreamError) + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |err| log.lock().unwrap().push(err.clone())
}
