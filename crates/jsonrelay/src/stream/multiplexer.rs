use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{runtime::Handle, sync::watch, task::JoinHandle, time::Instant};

use super::{
    SessionKey, Visibility,
    frame::{EventKind, StreamEvent},
    lock,
    policy::SessionConfig,
    session::{SessionSnapshot, SessionWorker, StreamSession},
    transport::{StreamRequest, Transport},
};
use crate::error::StreamError;

/// Callback for one kind of stream event.
pub type EventCallback = Arc<dyn Fn(&StreamEvent) + Send + Sync>;
/// Callback for open and close transitions.
pub type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;
/// Callback for session errors.
pub type ErrorCallback = Arc<dyn Fn(&StreamError) + Send + Sync>;

/// One consumer's callbacks. At most one callback per event kind; setting a
/// kind again replaces the earlier callback.
#[derive(Clone, Default)]
pub struct ConsumerTable {
    events: HashMap<EventKind, EventCallback>,
    pub(crate) on_open: Option<LifecycleCallback>,
    pub(crate) on_error: Option<ErrorCallback>,
    pub(crate) on_close: Option<LifecycleCallback>,
}

impl fmt::Debug for ConsumerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<String> = self.events.keys().map(ToString::to_string).collect();
        kinds.sort_unstable();
        f.debug_struct("ConsumerTable")
            .field("events", &kinds)
            .field("on_open", &self.on_open.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

impl ConsumerTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a callback for `kind`.
    #[must_use]
    pub fn on(mut self, kind: EventKind, f: impl Fn(&StreamEvent) + Send + Sync + 'static) -> Self {
        self.set(kind, Arc::new(f));
        self
    }

    /// Installs `callback` for `kind`, returning the one it replaced.
    pub fn set(&mut self, kind: EventKind, callback: EventCallback) -> Option<EventCallback> {
        self.events.insert(kind, callback)
    }

    /// Called after every successful open.
    #[must_use]
    pub fn on_open(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(f));
        self
    }

    /// Called once per session error.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&StreamError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Called when the stream ends normally.
    #[must_use]
    pub fn on_close(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(f));
        self
    }

    /// Whether a callback is installed for `kind`.
    #[must_use]
    pub fn handles(&self, kind: EventKind) -> bool {
        self.events.contains_key(&kind)
    }

    pub(crate) fn event(&self, kind: EventKind) -> Option<&EventCallback> {
        self.events.get(&kind)
    }
}

/// Identifies one consumer of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationHandle(u64);

/// Result of [`Multiplexer::acquire`].
#[derive(Debug)]
pub struct Acquired {
    /// The shared session.
    pub session: StreamSession,
    /// This consumer's registration.
    pub handle: RegistrationHandle,
}

struct Entry {
    session: StreamSession,
    consumers: BTreeSet<RegistrationHandle>,
}

struct Registry {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    sessions: Mutex<HashMap<SessionKey, Entry>>,
    visibility: watch::Sender<Visibility>,
    next_handle: AtomicU64,
    health: Mutex<Option<JoinHandle<()>>>,
}

/// Registry of live sessions, keyed by [`SessionKey`].
///
/// Consumers acquiring the same key share one stream. The stream is cancelled
/// when the last consumer releases it. Cloning yields another handle to the
/// same registry; dropping the last handle cancels every session.
#[derive(Clone)]
pub struct Multiplexer {
    registry: Arc<Registry>,
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("sessions", &self.len())
            .field("visibility", &self.visibility())
            .finish_non_exhaustive()
    }
}

impl Multiplexer {
    /// Creates a multiplexer with the default [`SessionConfig`].
    pub fn new(transport: impl Transport) -> Self {
        Self::with_config(Arc::new(transport), SessionConfig::default())
    }

    /// Creates a multiplexer sharing `transport` across sessions tuned by
    /// `config`.
    pub fn with_config(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let (visibility, _) = watch::channel(Visibility::Foreground);
        Self {
            registry: Arc::new(Registry {
                transport,
                config,
                sessions: Mutex::new(HashMap::new()),
                visibility,
                next_handle: AtomicU64::new(1),
                health: Mutex::new(None),
            }),
        }
    }

    /// Tuning applied to new sessions.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.registry.config
    }

    /// Joins the session for `key`, starting it with `request` if none is
    /// live.
    ///
    /// # Errors
    ///
    /// [`StreamError::NoRuntime`] when called outside a Tokio runtime.
    pub fn acquire(
        &self,
        key: impl Into<SessionKey>,
        request: StreamRequest,
    ) -> Result<Acquired, StreamError> {
        self.acquire_with(key, request, ConsumerTable::new())
    }

    /// Like [`acquire`](Self::acquire), registering `table` before the worker
    /// can deliver anything.
    ///
    /// # Errors
    ///
    /// [`StreamError::NoRuntime`] when called outside a Tokio runtime.
    pub fn acquire_with(
        &self,
        key: impl Into<SessionKey>,
        request: StreamRequest,
        table: ConsumerTable,
    ) -> Result<Acquired, StreamError> {
        let runtime = Handle::try_current().map_err(|_| StreamError::NoRuntime)?;
        let key = key.into();
        let handle = RegistrationHandle(self.registry.next_handle.fetch_add(1, Ordering::Relaxed));

        let mut sessions = self.sessions();
        if let Some(entry) = sessions.get_mut(&key) {
            if !entry.session.is_cancelled() {
                entry.consumers.insert(handle);
                entry.session.consumers().insert(handle, table);
                tracing::debug!(
                    event = "session_joined",
                    session = %key,
                    consumers = entry.consumers.len(),
                );
                return Ok(Acquired {
                    session: entry.session.clone(),
                    handle,
                });
            }
        }

        let session = StreamSession::new(key.clone());
        session.consumers().insert(handle, table);
        let worker = SessionWorker {
            session: session.clone(),
            transport: Arc::clone(&self.registry.transport),
            request,
            config: self.registry.config.clone(),
            visibility: self.registry.visibility.subscribe(),
        };
        runtime.spawn(worker.run());
        sessions.insert(
            key.clone(),
            Entry {
                session: session.clone(),
                consumers: BTreeSet::from([handle]),
            },
        );
        drop(sessions);

        tracing::info!(event = "session_created", session = %key);
        self.ensure_health_check(&runtime);
        Ok(Acquired { session, handle })
    }

    /// Replaces the callbacks registered under `handle`.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnknownSession`] or [`StreamError::UnknownRegistration`].
    pub fn register_callbacks(
        &self,
        key: &SessionKey,
        handle: RegistrationHandle,
        table: ConsumerTable,
    ) -> Result<(), StreamError> {
        let sessions = self.sessions();
        let entry = sessions
            .get(key)
            .ok_or_else(|| StreamError::UnknownSession(key.clone()))?;
        if !entry.consumers.contains(&handle) {
            return Err(StreamError::UnknownRegistration);
        }
        entry.session.consumers().insert(handle, table);
        Ok(())
    }

    /// Drops one consumer. The last release cancels the session and removes
    /// it from the registry.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnknownSession`] or [`StreamError::UnknownRegistration`].
    pub fn release(&self, key: &SessionKey, handle: RegistrationHandle) -> Result<(), StreamError> {
        let mut sessions = self.sessions();
        let entry = sessions
            .get_mut(key)
            .ok_or_else(|| StreamError::UnknownSession(key.clone()))?;
        if !entry.consumers.remove(&handle) {
            return Err(StreamError::UnknownRegistration);
        }
        entry.session.consumers().remove(&handle);
        tracing::debug!(event = "session_released", session = %key, consumers = entry.consumers.len());

        if entry.consumers.is_empty() {
            if let Some(entry) = sessions.remove(key) {
                entry.session.cancel();
                tracing::info!(event = "session_removed", session = %key);
            }
        }
        Ok(())
    }

    /// Records the host's visibility. Every call with
    /// [`Visibility::Foreground`] re-attempts parked and failed sessions.
    pub fn set_visibility(&self, visibility: Visibility) {
        let previous = self.registry.visibility.send_replace(visibility);
        if previous != visibility {
            tracing::debug!(event = "visibility_changed", visibility = ?visibility);
        }
        if visibility != Visibility::Foreground {
            return;
        }
        for session in self.registry.live_sessions() {
            if session.revive_foreground() {
                tracing::info!(event = "session_revived", session = %session.key(), reason = "foreground");
            }
        }
    }

    /// The last visibility recorded.
    #[must_use]
    pub fn visibility(&self) -> Visibility {
        *self.registry.visibility.borrow()
    }

    /// The live session for `key`.
    #[must_use]
    pub fn session(&self, key: &SessionKey) -> Option<StreamSession> {
        self.sessions().get(key).map(|entry| entry.session.clone())
    }

    /// A point-in-time view of the session for `key`.
    #[must_use]
    pub fn snapshot(&self, key: &SessionKey) -> Option<SessionSnapshot> {
        self.session(key).map(|session| session.snapshot())
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    /// `true` when no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionKey, Entry>> {
        lock(&self.registry.sessions)
    }

    fn ensure_health_check(&self, runtime: &Handle) {
        let mut slot = lock(&self.registry.health);
        if slot.is_some() {
            return;
        }
        let registry = Arc::downgrade(&self.registry);
        let interval = self.registry.config.health_check_interval;
        *slot = Some(runtime.spawn(health_check_loop(registry, interval)));
    }
}

async fn health_check_loop(registry: Weak<Registry>, interval: std::time::Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let Some(registry) = registry.upgrade() else {
            break;
        };
        registry.health_check();
    }
}

impl Registry {
    fn live_sessions(&self) -> Vec<StreamSession> {
        lock(&self.sessions)
            .values()
            .map(|entry| entry.session.clone())
            .collect()
    }

    fn health_check(&self) {
        if *self.visibility.borrow() != Visibility::Foreground {
            return;
        }
        let now = Instant::now();
        for session in self.live_sessions() {
            if session.revive_stale(now, &self.config) {
                tracing::info!(event = "session_revived", session = %session.key(), reason = "stale");
            }
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        if let Some(task) = self
            .health
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        let sessions = self
            .sessions
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for (_, entry) in sessions.drain() {
            entry.session.cancel();
        }
    }
}
