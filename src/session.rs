//! Per-connection `Session` state and the process-wide `SessionManager`
//! (spec.md §3 "Connection / Session", §4.2).
//!
//! Grounded on the teacher's `AgentRegistry` (`src/agent/registry.rs`) for
//! the keyed-map-of-`Arc<Mutex<_>>` shape and on `ResearchSessionManager`
//! (`src/research/session_manager.rs`) for the `DashMap` singleton +
//! background cleanup task pattern.

use crate::approval::PendingApproval;
use crate::engine::{EngineBrowser, EngineContext, EnginePage};
use crate::error::{BapError, BapResult};
use crate::rate_limit::SessionRateLimiter;
use crate::registry::ElementRegistry;
use crate::stream::ActiveStreamState;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(3600);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_MAX_CONTEXTS: usize = 5;
pub const DEFAULT_MAX_PAGES_PER_CLIENT: usize = 20;

/// A tab open within one of the session's contexts.
pub struct PageState {
    pub page: Box<dyn EnginePage>,
    pub context_name: String,
    pub registry: ElementRegistry,
    pub current_frame: Option<String>,
}

pub struct ContextState {
    pub context: Box<dyn EngineContext>,
    pub opts: crate::engine::ContextOptions,
    pub pages: HashMap<String, String>,
}

/// A running `trace/start`..`trace/stop` span (spec.md §6.2 "trace/*").
pub struct ActiveTrace {
    pub trace_id: String,
    pub started_at: Instant,
    pub page_id: String,
}

/// A frame the connection's writer task forwards to the WebSocket sink.
/// `Close` is distinguished from `Frame` so `Session::request_close` can
/// reach the sink even though the sink itself lives on the writer task,
/// not on `Session` (spec.md §4.2 "Session expiry", Testable Property #7).
pub enum OutboundMessage {
    Frame(String),
    Close { code: u16, reason: String },
}

/// Per-connection mutable state. Requests on one connection are serialized
/// (spec.md §5), so every field here is guarded by a single outer
/// `tokio::sync::Mutex` held by the connection's handler task, not by
/// per-field locks.
pub struct Session {
    pub id: String,
    pub initialized: bool,
    pub scopes: HashSet<String>,
    pub started_at: Instant,
    pub last_activity: Instant,
    pub browser: Option<Box<dyn EngineBrowser>>,
    pub browser_handler: Option<JoinHandle<()>>,
    pub contexts: HashMap<String, ContextState>,
    pub pages: HashMap<String, PageState>,
    pub active_page_id: Option<String>,
    pub subscribed_events: HashSet<String>,
    pub pending_approvals: HashMap<String, PendingApproval>,
    pub session_approved_rules: HashSet<String>,
    pub active_streams: HashMap<String, ActiveStreamState>,
    pub rate_limiter: SessionRateLimiter,
    /// `network/intercept` rules keyed by a server-assigned rule id. The
    /// shipped `chromiumoxide` engine does not wire these into the CDP Fetch
    /// domain yet (see `handlers::network`'s module doc); they are recorded
    /// here so `network/fulfill` / `network/abort` / `network/continue` have
    /// somewhere to validate against and so the rule set is observable via
    /// `network/intercept`'s own echo.
    pub network_rules: HashMap<String, serde_json::Value>,
    pub active_trace: Option<ActiveTrace>,
    /// Outbound notifications (events, `approval/required`, stream chunks)
    /// queued for the connection's writer task. A test session that never
    /// drains its receiver simply accumulates or drops sends once the
    /// receiver is gone; `send` is best-effort (spec.md §4.11 suspension
    /// points never block on a slow client).
    pub outbound: mpsc::UnboundedSender<OutboundMessage>,
    /// Signals the connection's read loop (`server::run_request_loop`) to
    /// stop reading once an external party (the cleanup task) has decided
    /// the session is expired. The read loop selects on this alongside the
    /// socket so a session torn down mid-request still gets a 1008 close
    /// sent to the client rather than just having its engine state yanked.
    close_tx: watch::Sender<bool>,
}

impl Session {
    pub(crate) fn new(
        id: String,
        scopes: HashSet<String>,
        now: Instant,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
        close_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            id,
            initialized: false,
            scopes,
            started_at: now,
            last_activity: now,
            browser: None,
            browser_handler: None,
            contexts: HashMap::new(),
            pages: HashMap::new(),
            active_page_id: None,
            subscribed_events: HashSet::new(),
            pending_approvals: HashMap::new(),
            session_approved_rules: HashSet::new(),
            active_streams: HashMap::new(),
            rate_limiter: SessionRateLimiter::new(),
            network_rules: HashMap::new(),
            active_trace: None,
            outbound,
            close_tx,
        }
    }

    /// Best-effort push of an already-encoded notification frame.
    pub fn notify(&self, frame: String) {
        let _ = self.outbound.send(OutboundMessage::Frame(frame));
    }

    /// Request that the connection be closed with the given WebSocket close
    /// code, and wake the read loop so it stops waiting on the socket.
    pub fn request_close(&self, code: u16, reason: impl Into<String>) {
        let _ = self.outbound.send(OutboundMessage::Close { code, reason: reason.into() });
        let _ = self.close_tx.send(true);
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn is_expired(&self, now: Instant, max_duration: Duration, idle_timeout: Duration) -> bool {
        now.saturating_duration_since(self.started_at) >= max_duration
            || now.saturating_duration_since(self.last_activity) >= idle_timeout
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Tear down every engine-owned resource the session holds. Called on
    /// socket close and on forced expiry (spec.md §5 "Cancellation").
    pub async fn shutdown(&mut self) {
        for (_, page) in self.pages.drain() {
            let _ = page.page.close().await;
        }
        for (_, ctx) in self.contexts.drain() {
            let _ = ctx.context.close().await;
        }
        if let Some(browser) = self.browser.take() {
            let _ = browser.close().await;
        }
        if let Some(handle) = self.browser_handler.take() {
            handle.abort();
        }
        for (_, approval) in self.pending_approvals.drain() {
            tracing::debug!(request_id = %approval.request_id, "rejecting pending approval on session shutdown");
            // Dropping the sender (rather than sending a decision) causes
            // the awaiting receiver to resolve to a closed-channel error,
            // which `approval::await_decision` maps to `TargetClosed`.
            drop(approval.responder);
        }
        self.active_streams.clear();
    }
}

/// A per-IP connection counter, decremented automatically on drop so a
/// dropped/aborted connection never leaks its slot.
pub struct ConnectionGuard {
    ip: IpAddr,
    manager: Arc<SessionManager>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(mut count) = self.manager.connections_per_ip.get_mut(&self.ip) {
            *count = count.saturating_sub(1);
        }
    }
}

pub struct SessionManager {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    connections_per_ip: DashMap<IpAddr, u32>,
    next_id: AtomicU64,
    max_connections_per_ip: u32,
    max_duration: Duration,
    idle_timeout: Duration,
}

static MANAGER: OnceLock<Arc<SessionManager>> = OnceLock::new();

impl SessionManager {
    pub fn global() -> Arc<SessionManager> {
        MANAGER
            .get_or_init(|| {
                Arc::new(SessionManager::new(
                    crate::config::Config::from_env().max_connections_per_ip,
                    DEFAULT_MAX_DURATION,
                    DEFAULT_IDLE_TIMEOUT,
                ))
            })
            .clone()
    }

    pub fn new(max_connections_per_ip: u32, max_duration: Duration, idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            connections_per_ip: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_connections_per_ip,
            max_duration,
            idle_timeout,
        }
    }

    /// Reserve a connection slot for `ip`. Returns `ResourceLimitExceeded`
    /// if the per-IP cap (spec.md §4.2, default 10) is already reached.
    pub fn reserve_connection(self: &Arc<Self>, ip: IpAddr) -> BapResult<ConnectionGuard> {
        let mut count = self.connections_per_ip.entry(ip).or_insert(0);
        if *count >= self.max_connections_per_ip {
            return Err(BapError::new(
                crate::error::ErrorCode::ResourceLimitExceeded,
                "Too many connections from this address",
            ));
        }
        *count += 1;
        Ok(ConnectionGuard { ip, manager: self.clone() })
    }

    /// Create a session and return it alongside the receiving half of its
    /// outbound notification channel and its close-signal receiver; the
    /// caller (the connection's accept loop) owns forwarding the former to
    /// the WebSocket sink and selecting on the latter in its read loop.
    pub fn create_session(
        &self,
        scopes: HashSet<String>,
        now: Instant,
    ) -> (Arc<Mutex<Session>>, mpsc::UnboundedReceiver<OutboundMessage>, watch::Receiver<bool>) {
        let id = format!("sess_{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);
        let session = Arc::new(Mutex::new(Session::new(id.clone(), scopes, now, tx, close_tx)));
        self.sessions.insert(id, session.clone());
        (session, rx, close_rx)
    }

    pub async fn remove_session(&self, id: &str) {
        if let Some((_, session)) = self.sessions.remove(id) {
            session.lock().await.shutdown().await;
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Spawn the periodic task that force-closes expired sessions. Grounded
    /// on `ResearchSessionManager::spawn_cleanup_task`'s interval-based
    /// eviction loop.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let now = Instant::now();
                let expired: Vec<String> = manager
                    .sessions
                    .iter()
                    .filter_map(|entry| {
                        let guard = entry.value().try_lock().ok()?;
                        guard
                            .is_expired(now, manager.max_duration, manager.idle_timeout)
                            .then(|| entry.key().clone())
                    })
                    .collect();
                for id in expired {
                    tracing::info!(session_id = %id, "closing expired session");
                    if let Some(session) = manager.sessions.get(&id) {
                        session.lock().await.request_close(1008, "session expired");
                    }
                    manager.remove_session(&id).await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session(now: Instant) -> Session {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (close_tx, _close_rx) = watch::channel(false);
        Session::new("s1".into(), HashSet::new(), now, tx, close_tx)
    }

    #[test]
    fn expiry_triggers_on_idle_timeout() {
        let now = Instant::now();
        let session = test_session(now);
        let later = now + Duration::from_secs(601);
        assert!(session.is_expired(later, DEFAULT_MAX_DURATION, DEFAULT_IDLE_TIMEOUT));
    }

    #[test]
    fn expiry_triggers_on_max_duration() {
        let now = Instant::now();
        let session = test_session(now);
        let later = now + Duration::from_secs(3601);
        assert!(session.is_expired(later, DEFAULT_MAX_DURATION, DEFAULT_IDLE_TIMEOUT));
    }

    #[test]
    fn fresh_session_not_expired() {
        let now = Instant::now();
        let session = test_session(now);
        assert!(!session.is_expired(now, DEFAULT_MAX_DURATION, DEFAULT_IDLE_TIMEOUT));
    }

    #[test]
    fn request_close_signals_watch_and_outbound() {
        let now = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (close_tx, mut close_rx) = watch::channel(false);
        let session = Session::new("s1".into(), HashSet::new(), now, tx, close_tx);
        session.request_close(1008, "session expired");
        assert!(*close_rx.borrow_and_update());
        match rx.try_recv().unwrap() {
            OutboundMessage::Close { code, reason } => {
                assert_eq!(code, 1008);
                assert_eq!(reason, "session expired");
            }
            OutboundMessage::Frame(_) => panic!("expected a close message"),
        }
    }

    #[test]
    fn per_ip_connection_cap_enforced() {
        let manager = Arc::new(SessionManager::new(2, DEFAULT_MAX_DURATION, DEFAULT_IDLE_TIMEOUT));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let _a = manager.reserve_connection(ip).unwrap();
        let _b = manager.reserve_connection(ip).unwrap();
        assert!(manager.reserve_connection(ip).is_err());
    }

    #[test]
    fn dropping_connection_guard_frees_slot() {
        let manager = Arc::new(SessionManager::new(1, DEFAULT_MAX_DURATION, DEFAULT_IDLE_TIMEOUT));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        {
            let _a = manager.reserve_connection(ip).unwrap();
            assert!(manager.reserve_connection(ip).is_err());
        }
        assert!(manager.reserve_connection(ip).is_ok());
    }
}
