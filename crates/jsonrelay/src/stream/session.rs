//! A single logical stream and the worker task that keeps it alive.

use std::{
    collections::BTreeMap,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures_util::{FutureExt, StreamExt};
use tokio::{
    sync::{Notify, watch},
    time::Instant,
};

use super::{
    ConnectionState, SessionKey, Visibility,
    frame::{RawFrame, StreamEvent},
    lock,
    multiplexer::{ConsumerTable, EventCallback, RegistrationHandle},
    policy::SessionConfig,
    transport::{FrameStream, StreamRequest, Transport, TransportError},
};
use crate::{error::StreamError, matcher::panic_message};

pub(crate) type ConsumerMap = BTreeMap<RegistrationHandle, ConsumerTable>;

#[derive(Debug)]
struct Status {
    state: ConnectionState,
    attempts: u32,
    last_connected: Option<Instant>,
    errored_at: Option<Instant>,
    auth_expired: bool,
    exhausted: bool,
}

struct Shared {
    key: SessionKey,
    status: Mutex<Status>,
    cancel: watch::Sender<bool>,
    wake: Notify,
    unhandled: AtomicU64,
    consumers: Mutex<ConsumerMap>,
}

/// Handle to one live session.
///
/// Cloning is cheap; every clone observes the same session.
#[derive(Clone)]
pub struct StreamSession {
    shared: Arc<Shared>,
}

/// Point-in-time view of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// The session key.
    pub key: SessionKey,
    /// Connection state.
    pub state: ConnectionState,
    /// Failures since the last successful open.
    pub attempts: u32,
    /// Time since the last successful open.
    pub since_last_connect: Option<Duration>,
    /// Registered consumers.
    pub consumers: usize,
    /// Frames no consumer had a callback for.
    pub unhandled_frames: u64,
    /// Whether the session has been cancelled.
    pub cancelled: bool,
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("key", &self.shared.key)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    pub(crate) fn new(key: SessionKey) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                key,
                status: Mutex::new(Status {
                    state: ConnectionState::Connecting,
                    attempts: 0,
                    last_connected: None,
                    errored_at: None,
                    auth_expired: false,
                    exhausted: false,
                }),
                cancel,
                wake: Notify::new(),
                unhandled: AtomicU64::new(0),
                consumers: Mutex::new(ConsumerMap::new()),
            }),
        }
    }

    /// The session key.
    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.shared.key
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status().state
    }

    /// Failures since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.status().attempts
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.shared.cancel.borrow()
    }

    /// Whether `other` is a handle to the same session.
    #[must_use]
    pub fn same_session(&self, other: &StreamSession) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// A point-in-time view.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let status = self.status();
        SessionSnapshot {
            key: self.shared.key.clone(),
            state: status.state,
            attempts: status.attempts,
            since_last_connect: status.last_connected.map(|t| t.elapsed()),
            consumers: self.consumers().len(),
            unhandled_frames: self.shared.unhandled.load(Ordering::Relaxed),
            cancelled: self.is_cancelled(),
        }
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        lock(&self.shared.status)
    }

    pub(crate) fn consumers(&self) -> MutexGuard<'_, ConsumerMap> {
        lock(&self.shared.consumers)
    }

    /// Requests cancellation. Returns `false` if it was already requested.
    pub(crate) fn cancel(&self) -> bool {
        let changed = self.shared.cancel.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        });
        if changed {
            tracing::debug!(event = "session_cancelled", session = %self.shared.key);
        }
        changed
    }

    /// Foreground transition: retry a parked session now with half the
    /// attempts on the clock.
    pub(crate) fn revive_foreground(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        {
            let mut status = self.status();
            if status.auth_expired
                || !matches!(
                    status.state,
                    ConnectionState::Disconnected | ConnectionState::Error
                )
            {
                return false;
            }
            status.attempts /= 2;
            status.exhausted = false;
        }
        self.shared.wake.notify_one();
        true
    }

    /// Health check: retry a session stuck in `Error` for longer than
    /// `stale_after`, leaving it `health_check_attempts` more tries.
    pub(crate) fn revive_stale(&self, now: Instant, config: &SessionConfig) -> bool {
        if self.is_cancelled() {
            return false;
        }
        {
            let mut status = self.status();
            let stale = status
                .errored_at
                .is_some_and(|t| now.saturating_duration_since(t) >= config.stale_after);
            if status.state != ConnectionState::Error || status.auth_expired || !stale {
                return false;
            }
            let budget = config
                .policy
                .max_attempts
                .saturating_sub(config.health_check_attempts);
            status.attempts = status.attempts.min(budget);
            status.exhausted = false;
        }
        self.shared.wake.notify_one();
        true
    }
}

enum Outcome {
    Closed,
    Failed(TransportError),
    Cancelled,
}

enum Next {
    Retry(Duration),
    Park,
    Stop,
}

/// Owns the transport side of one session.
pub(crate) struct SessionWorker {
    pub session: StreamSession,
    pub transport: Arc<dyn Transport>,
    pub request: StreamRequest,
    pub config: SessionConfig,
    pub visibility: watch::Receiver<Visibility>,
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl SessionWorker {
    pub async fn run(self) {
        let mut cancel = self.session.shared.cancel.subscribe();
        let key = self.session.key().clone();

        loop {
            if *cancel.borrow() {
                break;
            }
            self.set_state(ConnectionState::Connecting);
            tracing::debug!(event = "session_connecting", session = %key, url = %self.request.url);

            let opened = tokio::select! {
                biased;
                () = cancelled(&mut cancel) => break,
                opened = self.transport.open(&self.request) => opened,
            };
            let outcome = match opened {
                Ok(frames) => {
                    self.on_open();
                    self.pump(frames, &mut cancel).await
                }
                Err(err) => Outcome::Failed(err),
            };
            let next = match outcome {
                Outcome::Cancelled => break,
                Outcome::Closed => self.on_close(),
                Outcome::Failed(err) => self.on_error(err),
            };

            match next {
                Next::Stop => break,
                Next::Retry(delay) => {
                    let woken = tokio::select! {
                        biased;
                        () = cancelled(&mut cancel) => break,
                        () = tokio::time::sleep(delay) => false,
                        () = self.session.shared.wake.notified() => true,
                    };
                    if !woken {
                        // A revive that lost the race to the deadline is spent
                        // by this attempt, not by a later park.
                        let _ = self.session.shared.wake.notified().now_or_never();
                    }
                }
                Next::Park => {
                    tracing::debug!(event = "session_parked", session = %key);
                    tokio::select! {
                        biased;
                        () = cancelled(&mut cancel) => break,
                        () = self.session.shared.wake.notified() => {}
                    }
                }
            }
        }

        if self.session.is_cancelled() {
            self.set_state(ConnectionState::Disconnected);
        }
        tracing::debug!(event = "session_stopped", session = %key);
    }

    fn set_state(&self, state: ConnectionState) {
        self.session.status().state = state;
    }

    async fn pump(&self, mut frames: FrameStream, cancel: &mut watch::Receiver<bool>) -> Outcome {
        loop {
            let next = tokio::select! {
                biased;
                () = cancelled(cancel) => return Outcome::Cancelled,
                next = frames.next() => next,
            };
            match next {
                Some(Ok(frame)) => {
                    if *cancel.borrow() {
                        return Outcome::Cancelled;
                    }
                    self.dispatch(frame);
                }
                Some(Err(err)) => return Outcome::Failed(err),
                None => return Outcome::Closed,
            }
        }
    }

    fn dispatch(&self, frame: RawFrame) {
        let event = StreamEvent::from(frame);
        let kind = event.kind();
        let callbacks: Vec<EventCallback> = self
            .session
            .consumers()
            .values()
            .filter_map(|table| table.event(kind).cloned())
            .collect();

        if callbacks.is_empty() {
            let total = self.session.shared.unhandled.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(
                event = "frame_unhandled",
                session = %self.session.key(),
                kind = %kind,
                total,
            );
            return;
        }
        for callback in callbacks {
            self.guarded("event", || callback(&event));
        }
    }

    fn guarded(&self, callback: &'static str, f: impl FnOnce()) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
            tracing::error!(
                event = "consumer_callback_panicked",
                session = %self.session.key(),
                callback,
                message = panic_message(panic.as_ref()),
            );
        }
    }

    fn on_open(&self) {
        {
            let mut status = self.session.status();
            status.state = ConnectionState::Connected;
            status.attempts = 0;
            status.last_connected = Some(Instant::now());
            status.errored_at = None;
            status.exhausted = false;
        }
        tracing::info!(event = "session_connected", session = %self.session.key());

        let callbacks: Vec<_> = self
            .session
            .consumers()
            .values()
            .filter_map(|table| table.on_open.clone())
            .collect();
        for callback in callbacks {
            self.guarded("open", || callback());
        }
    }

    fn on_close(&self) -> Next {
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(event = "session_closed", session = %self.session.key());

        let callbacks: Vec<_> = self
            .session
            .consumers()
            .values()
            .filter_map(|table| table.on_close.clone())
            .collect();
        for callback in callbacks {
            self.guarded("close", || callback());
        }

        if self.session.is_cancelled() {
            Next::Stop
        } else if self.config.reconnect_on_close {
            Next::Retry(Duration::ZERO)
        } else {
            Next::Park
        }
    }

    fn fan_out_error(&self, err: &StreamError) {
        let callbacks: Vec<_> = self
            .session
            .consumers()
            .values()
            .filter_map(|table| table.on_error.clone())
            .collect();
        for callback in callbacks {
            self.guarded("error", || callback(err));
        }
    }

    fn on_error(&self, err: TransportError) -> Next {
        let key = self.session.key();
        let auth_expired = err == TransportError::AuthExpired;
        let (attempts, last_connected, newly_exhausted) = {
            let mut status = self.session.status();
            status.state = ConnectionState::Error;
            status.attempts = status.attempts.saturating_add(1);
            status.errored_at = Some(Instant::now());
            status.auth_expired |= auth_expired;
            let over = status.attempts >= self.config.policy.max_attempts;
            let newly_exhausted = over && !status.exhausted;
            status.exhausted |= over;
            (status.attempts, status.last_connected, newly_exhausted)
        };

        if auth_expired {
            tracing::warn!(event = "session_auth_expired", session = %key);
            self.fan_out_error(&StreamError::AuthExpired);
            return Next::Stop;
        }

        tracing::warn!(event = "session_error", session = %key, attempt = attempts, error = %err);
        self.fan_out_error(&StreamError::Transport(err));

        if self.session.is_cancelled() {
            return Next::Stop;
        }
        if attempts >= self.config.policy.max_attempts {
            if newly_exhausted {
                tracing::error!(event = "session_retries_exhausted", session = %key, attempts);
                self.fan_out_error(&StreamError::MaxRetriesExceeded { attempts });
            }
            return Next::Park;
        }

        let visibility = *self.visibility.borrow();
        let recently_connected = last_connected
            .is_some_and(|t| t.elapsed() < self.config.background_retry_after);
        if visibility == Visibility::Background && recently_connected {
            return Next::Park;
        }

        let delay = self.config.policy.delay_for_attempt(attempts, visibility);
        tracing::debug!(
            event = "reconnect_scheduled",
            session = %key,
            attempt = attempts,
            max_attempts = self.config.policy.max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        );
        Next::Retry(delay)
    }
}
