//! MCP session management.
//!
//! Manages session lifecycle for MCP HTTP + SSE connections. Each session
//! owns the sending half of its push channel and the cancellation token of
//! its keep-alive task; [`Session::teardown`] is the only place where either
//! is released, and it always releases both.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Capacity of each session's push channel.
pub const CHANNEL_CAPACITY: usize = 64;

/// Events written down a session's push channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Handshake: tells the client where to post its messages.
    Endpoint(String),
    /// A JSON-RPC message to send to the client.
    Message(String),
    /// No-op marker keeping intermediaries from closing an idle stream.
    KeepAlive,
}

/// Lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, handshake not yet delivered.
    Opening,
    /// Handshake delivered; commands are routed to this session.
    Open,
    /// Teardown in progress.
    Closing,
    /// Timer cancelled and registry entry removed.
    Closed,
}

/// Why a session was torn down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    ClientDisconnected,
    HandshakeFailed,
    ChannelDead,
    ChannelFull,
    Removed,
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::ClientDisconnected => "client disconnected",
            CloseReason::HandshakeFailed => "handshake failed",
            CloseReason::ChannelDead => "push channel no longer writable",
            CloseReason::ChannelFull => "client stopped reading its stream",
            CloseReason::Removed => "removed from registry",
            CloseReason::Shutdown => "server shutting down",
        };
        f.write_str(reason)
    }
}

/// Failure to deliver the handshake event.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("push channel closed before handshake")]
    ChannelClosed,

    #[error("push channel full before handshake")]
    ChannelFull,

    #[error("session is {0:?}, expected Opening")]
    NotOpening(SessionState),
}

/// Failure to queue an event on a session's push channel.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push channel of session {0} is closed")]
    Closed(String),

    /// The client stopped reading its stream.
    #[error("push channel of session {0} is full")]
    Full(String),
}

/// An MCP session.
pub struct Session {
    /// Unique session identifier.
    id: String,
    /// When the session was created.
    created_at: Instant,
    /// Sending half of the push channel.
    tx: mpsc::Sender<SessionEvent>,
    state: Mutex<SessionState>,
    /// Cancels the keep-alive task and ends the SSE stream.
    keep_alive: CancellationToken,
    registry: Weak<RegistryInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Get the session age in seconds.
    pub fn age_secs(&self) -> u64 {
        self.created_at.elapsed().as_secs()
    }

    /// Whether the keep-alive task is still scheduled.
    pub fn keep_alive_active(&self) -> bool {
        !self.keep_alive.is_cancelled()
    }

    /// Resolves once the session has been torn down.
    pub fn closed(&self) -> WaitForCancellationFutureOwned {
        self.keep_alive.clone().cancelled_owned()
    }

    /// Deliver the handshake and move from `Opening` to `Open`.
    pub fn handshake(&self, endpoint: &str) -> Result<(), HandshakeError> {
        let mut state = self.state.lock();
        if *state != SessionState::Opening {
            return Err(HandshakeError::NotOpening(*state));
        }
        match self.tx.try_send(SessionEvent::Endpoint(endpoint.to_string())) {
            Ok(()) => {
                *state = SessionState::Open;
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(HandshakeError::ChannelClosed),
            Err(TrySendError::Full(_)) => Err(HandshakeError::ChannelFull),
        }
    }

    /// Queue an event on the push channel without waiting for room.
    pub fn push(&self, event: SessionEvent) -> Result<(), PushError> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Closed(_) => PushError::Closed(self.id.clone()),
            TrySendError::Full(_) => PushError::Full(self.id.clone()),
        })
    }

    /// Release the keep-alive timer and the registry entry together.
    ///
    /// Idempotent: returns `false` if teardown already happened.
    pub fn teardown(&self, reason: CloseReason) -> bool {
        let mut state = self.state.lock();
        if matches!(*state, SessionState::Closing | SessionState::Closed) {
            return false;
        }
        *state = SessionState::Closing;

        self.keep_alive.cancel();
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self);
        }

        *state = SessionState::Closed;
        info!(
            "Closed MCP session {} after {}s: {}",
            self.id,
            self.age_secs(),
            reason
        );
        true
    }

    /// One keep-alive tick. Returns `false` once the session is gone.
    fn keep_alive_tick(&self) -> bool {
        let registered = self
            .registry
            .upgrade()
            .map(|r| r.is_current(self))
            .unwrap_or(false);
        if !registered {
            self.teardown(CloseReason::Removed);
            return false;
        }

        match self.tx.try_send(SessionEvent::KeepAlive) {
            Ok(()) => {
                debug!("keepalive: {}", self.id);
                true
            }
            // Backed up but still being read; skip this tick.
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => {
                self.teardown(CloseReason::ChannelDead);
                false
            }
        }
    }
}

fn spawn_keep_alive(session: &Arc<Session>, period: Duration) {
    let weak = Arc::downgrade(session);
    let token = session.keep_alive.clone();

    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(session) = weak.upgrade() else { break };
                    if !session.keep_alive_tick() {
                        break;
                    }
                }
            }
        }
    });
}

#[derive(Default)]
struct RegistryInner {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl RegistryInner {
    fn is_current(&self, session: &Session) -> bool {
        self.sessions
            .read()
            .get(&session.id)
            .is_some_and(|s| std::ptr::eq(Arc::as_ptr(s), session))
    }

    /// Remove the entry for `session`, leaving a newer entry under the same id alone.
    fn detach(&self, session: &Session) {
        let mut sessions = self.sessions.write();
        if sessions
            .get(&session.id)
            .is_some_and(|s| std::ptr::eq(Arc::as_ptr(s), session))
        {
            sessions.remove(&session.id);
        }
    }
}

/// Registry of live MCP sessions, keyed by session id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate and register a new session, then start its keep-alive task.
    ///
    /// The session is registered before anything is written to its channel,
    /// so its id resolves as soon as it is disclosed to the client.
    pub fn create_session(
        &self,
        keep_alive: Duration,
    ) -> (Arc<Session>, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let session = {
            let mut sessions = self.inner.sessions.write();
            let id = loop {
                let candidate = Uuid::new_v4().to_string();
                if !sessions.contains_key(&candidate) {
                    break candidate;
                }
            };
            let session = Arc::new(Session {
                id: id.clone(),
                created_at: Instant::now(),
                tx,
                state: Mutex::new(SessionState::Opening),
                keep_alive: CancellationToken::new(),
                registry: Arc::downgrade(&self.inner),
            });
            sessions.insert(id, session.clone());
            session
        };

        spawn_keep_alive(&session, keep_alive);
        info!("Created MCP session: {}", session.id);
        (session, rx)
    }

    /// Insert a session, returning the one it replaced.
    ///
    /// A replaced session is no longer reachable and is torn down.
    pub fn register(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let previous = self
            .inner
            .sessions
            .write()
            .insert(session.id.clone(), session);
        if let Some(ref old) = previous {
            warn!("MCP session {} replaced", old.id);
            old.teardown(CloseReason::Removed);
        }
        previous
    }

    /// Get a session by ID.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.inner.sessions.read().get(id).cloned()
    }

    /// Check if a session exists.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.sessions.read().contains_key(id)
    }

    /// Tear down the session under `id`, if any.
    pub fn remove(&self, id: &str) -> bool {
        match self.get(id) {
            Some(session) => session.teardown(CloseReason::Removed),
            None => false,
        }
    }

    /// Get the number of active sessions.
    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<String> {
        self.inner.sessions.read().keys().cloned().collect()
    }

    /// Tear down every session; their SSE streams end.
    pub fn close_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = self.inner.sessions.read().values().cloned().collect();
        sessions
            .iter()
            .filter(|s| s.teardown(CloseReason::Shutdown))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const PERIOD: Duration = Duration::from_secs(25);

    #[tokio::test]
    async fn test_create_registers_before_handshake() {
        let registry = SessionRegistry::new();
        let (session, mut rx) = registry.create_session(PERIOD);

        assert!(registry.contains(session.id()));
        assert_eq!(session.state(), SessionState::Opening);
        assert!(session.keep_alive_active());

        session.handshake("/messages?sessionId=x").unwrap();
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::Endpoint("/messages?sessionId=x".to_string()))
        );
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let registry = SessionRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..50 {
            receivers.push(registry.create_session(PERIOD));
        }
        assert_eq!(registry.len(), 50);

        let ids: std::collections::HashSet<String> = registry.ids().into_iter().collect();
        assert_eq!(ids.len(), 50);
        assert!(receivers.iter().all(|(s, _)| ids.contains(s.id())));
    }

    #[tokio::test]
    async fn test_push_does_not_wait_on_full_channel() {
        let registry = SessionRegistry::new();
        let (session, mut rx) = registry.create_session(PERIOD);

        for i in 0..CHANNEL_CAPACITY {
            session
                .push(SessionEvent::Message(i.to_string()))
                .unwrap();
        }
        let err = session
            .push(SessionEvent::Message("overflow".to_string()))
            .unwrap_err();
        assert!(matches!(err, PushError::Full(_)));

        // Room again once the reader catches up.
        rx.recv().await.unwrap();
        session
            .push(SessionEvent::Message("next".to_string()))
            .unwrap();

        drop(rx);
        let err = session.push(SessionEvent::KeepAlive).unwrap_err();
        assert!(matches!(err, PushError::Closed(_)));
    }

    #[tokio::test]
    async fn test_teardown_releases_timer_and_entry_once() {
        let registry = SessionRegistry::new();
        let (session, _rx) = registry.create_session(PERIOD);

        assert!(session.teardown(CloseReason::ClientDisconnected));
        assert!(!registry.contains(session.id()));
        assert!(!session.keep_alive_active());
        assert_eq!(session.state(), SessionState::Closed);

        assert!(!session.teardown(CloseReason::ClientDisconnected));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let (session, _rx) = registry.create_session(PERIOD);

        assert!(registry.remove(session.id()));
        assert!(!session.keep_alive_active());
        assert!(!registry.remove(session.id()));
        assert!(!registry.remove("never-issued"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_handshake_failure_on_dropped_receiver() {
        let registry = SessionRegistry::new();
        let (session, rx) = registry.create_session(PERIOD);
        drop(rx);

        let err = session.handshake("/messages").unwrap_err();
        assert!(matches!(err, HandshakeError::ChannelClosed));

        session.teardown(CloseReason::HandshakeFailed);
        assert!(registry.is_empty());
        assert!(!session.keep_alive_active());
    }

    #[tokio::test]
    async fn test_handshake_after_close_rejected() {
        let registry = SessionRegistry::new();
        let (session, _rx) = registry.create_session(PERIOD);
        session.teardown(CloseReason::Removed);

        let err = session.handshake("/messages").unwrap_err();
        assert!(matches!(err, HandshakeError::NotOpening(SessionState::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_ticks_periodically() {
        let registry = SessionRegistry::new();
        let (session, mut rx) = registry.create_session(PERIOD);
        session.handshake("/messages").unwrap();
        rx.recv().await.unwrap();

        // Nothing before the first full period.
        assert!(timeout(PERIOD - Duration::from_secs(1), rx.recv())
            .await
            .is_err());

        for _ in 0..3 {
            let event = timeout(PERIOD * 2, rx.recv()).await.unwrap();
            assert_eq!(event, Some(SessionEvent::KeepAlive));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_teardown() {
        let registry = SessionRegistry::new();
        let (session, mut rx) = registry.create_session(PERIOD);

        let event = timeout(PERIOD * 2, rx.recv()).await.unwrap();
        assert_eq!(event, Some(SessionEvent::KeepAlive));

        session.teardown(CloseReason::ClientDisconnected);
        tokio::time::sleep(PERIOD * 4).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(registry.contains(session.id()), session.keep_alive_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_channel_detected_by_keep_alive() {
        let registry = SessionRegistry::new();
        let (session, rx) = registry.create_session(PERIOD);
        drop(rx);

        tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;

        assert_eq!(session.state(), SessionState::Closed);
        assert!(!registry.contains(session.id()));
        assert!(!session.keep_alive_active());
    }

    #[tokio::test]
    async fn test_register_replacing_tears_down_previous() {
        let registry = SessionRegistry::new();
        let (first, _rx) = registry.create_session(PERIOD);

        let (tx, _rx2) = mpsc::channel(1);
        let impostor = Arc::new(Session {
            id: first.id().to_string(),
            created_at: Instant::now(),
            tx,
            state: Mutex::new(SessionState::Opening),
            keep_alive: CancellationToken::new(),
            registry: Arc::downgrade(&registry.inner),
        });

        let replaced = registry.register(impostor.clone()).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
        assert!(!first.keep_alive_active());
        // The newer entry survives the old session's teardown.
        assert!(Arc::ptr_eq(&registry.get(first.id()).unwrap(), &impostor));
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = registry.create_session(PERIOD);
        let (b, _rx_b) = registry.create_session(PERIOD);

        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());
        assert!(!a.keep_alive_active() && !b.keep_alive_active());

        // `closed()` resolves once torn down.
        a.closed().await;
    }
}
