//! Feed connection manager.
//!
//! Owns the single transport to the price feed. Handles the connection
//! lifecycle, the ping heartbeat, automatic reconnection with exponential
//! backoff, and replay of the wanted-symbol set after every connect.
//!
//! All state lives behind locks owned by the manager. The supervisor task
//! spawned by `connect()` is the only writer of the transport; callers only
//! see `send()`, which enqueues onto the live session.

use crate::backoff::Backoff;
use crate::error::{WsError, WsResult};
use crate::handlers::FrameHandlers;
use crate::heartbeat::{HeartbeatStats, HeartbeatTracker, DEFAULT_HEARTBEAT_INTERVAL};
use crate::link::{FeedLink, ReplaySource};
use crate::message::{ClientFrame, FeedFrame};
use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long a Close frame may take on caller-initiated teardown.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// How long `disconnect()` waits for the supervisor before aborting it.
const SUPERVISOR_GRACE: Duration = Duration::from_secs(2);

/// Control frames queued for the live session before new ones are dropped.
const OUTBOUND_CAPACITY: usize = 256;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Feed WebSocket URL (ws:// or wss://).
    pub url: String,
    /// First reconnect delay, and the delay after any successful connect.
    pub backoff_floor_ms: u64,
    /// Maximum reconnect delay.
    pub backoff_ceiling_ms: u64,
    /// Ping interval while connected.
    pub heartbeat_interval_ms: u64,
    /// Give up on a single open attempt after this long.
    pub open_timeout_ms: u64,
    /// Treat the session as dead when one frame write blocks this long.
    pub write_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            backoff_floor_ms: 1000,
            backoff_ceiling_ms: 30_000,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64,
            open_timeout_ms: 10_000,
            write_timeout_ms: 10_000,
        }
    }
}

impl ConnectionConfig {
    /// Create a config for `url` with default timings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Validate that `url` is a structurally usable feed endpoint.
pub fn validate_endpoint(url: &str) -> WsResult<()> {
    if url.trim().is_empty() {
        return Err(WsError::InvalidEndpoint("endpoint address is empty".to_string()));
    }
    let parsed = url::Url::parse(url)
        .map_err(|e| WsError::InvalidEndpoint(format!("{url}: {e}")))?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(WsError::InvalidEndpoint(format!(
            "{url}: scheme must be ws or wss, got {}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(WsError::InvalidEndpoint(format!("{url}: missing host")));
    }
    Ok(())
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Connection statistics.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Transport open attempts.
    pub connect_attempts: u64,
    /// Successful opens.
    pub connects: u64,
    /// Reconnects scheduled after unplanned closes or failed opens.
    pub reconnects_scheduled: u64,
    /// Inbound text frames.
    pub frames_received: u64,
    /// Inbound text frames dropped as unrecognized or malformed.
    pub frames_dropped: u64,
    /// Pings sent.
    pub pings_sent: u64,
    /// Pongs received.
    pub pongs_received: u64,
    /// Heartbeat timing.
    pub heartbeat: HeartbeatStats,
}

#[derive(Debug, Default)]
struct Counters {
    connect_attempts: AtomicU64,
    connects: AtomicU64,
    reconnects_scheduled: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    pings_sent: AtomicU64,
    pongs_received: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// State and outbound queue of the live session, changed together.
struct Link {
    state: ConnectionState,
    outbound: Option<mpsc::Sender<String>>,
}

struct Supervisor {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct Shared {
    config: ConnectionConfig,
    link: RwLock<Link>,
    backoff: Mutex<Backoff>,
    supervisor: Mutex<Option<Supervisor>>,
    reconnect_pending: AtomicBool,
    retry_now: Notify,
    heartbeat: HeartbeatTracker,
    handlers: FrameHandlers,
    replay_source: RwLock<Option<Arc<dyn ReplaySource>>>,
    last_error: RwLock<Option<String>>,
    counters: Counters,
}

/// How a session ended.
enum SessionEnd {
    /// Caller-initiated teardown.
    Cancelled,
    /// Open failed or the live connection dropped.
    Failed(WsError),
}

/// Feed connection manager.
///
/// Cheap to clone; all clones share the one connection. Construct one per
/// application and hand it to the subscription registry.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a new connection manager. Nothing happens until `connect()`.
    pub fn new(config: ConnectionConfig) -> Self {
        let backoff = Backoff::new(
            Duration::from_millis(config.backoff_floor_ms),
            Duration::from_millis(config.backoff_ceiling_ms),
        );
        let heartbeat = HeartbeatTracker::new(Duration::from_millis(
            config.heartbeat_interval_ms.max(1),
        ));
        Self {
            shared: Arc::new(Shared {
                config,
                link: RwLock::new(Link {
                    state: ConnectionState::Disconnected,
                    outbound: None,
                }),
                backoff: Mutex::new(backoff),
                supervisor: Mutex::new(None),
                reconnect_pending: AtomicBool::new(false),
                retry_now: Notify::new(),
                heartbeat,
                handlers: FrameHandlers::new(),
                replay_source: RwLock::new(None),
                last_error: RwLock::new(None),
                counters: Counters::default(),
            }),
        }
    }

    /// Get connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Start the connection.
    ///
    /// Idempotent: a no-op while a connection is open or opening. While a
    /// reconnect delay is running, the delay is cut short and the next
    /// attempt starts at once. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `WsError::InvalidEndpoint`: the configured URL can never work;
    ///   no retry loop is started.
    pub fn connect(&self) -> WsResult<()> {
        if let Err(e) = validate_endpoint(&self.shared.config.url) {
            error!(error = %e, "Refusing to connect");
            *self.shared.last_error.write() = Some(e.to_string());
            return Err(e);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WsError::ConnectionFailed(format!("no async runtime: {e}")))?;

        let mut slot = self.shared.supervisor.lock();
        if slot.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            if self.shared.reconnect_pending.load(Ordering::SeqCst) {
                debug!("connect() during backoff, retrying now");
                self.shared.retry_now.notify_waiters();
            } else {
                debug!("connect() ignored, connection already active");
            }
            return Ok(());
        }

        let token = CancellationToken::new();
        self.shared.link.write().state = ConnectionState::Connecting;

        let shared = self.shared.clone();
        let handle = runtime.spawn(run_supervisor(shared, token.clone()));
        *slot = Some(Supervisor { token, handle });
        Ok(())
    }

    /// Tear the connection down.
    ///
    /// Cancels any pending reconnect and the heartbeat, closes the transport
    /// if open, and waits for the supervisor task to finish, so nothing
    /// further happens until `connect()` is called again. A supervisor that
    /// does not stop within a short grace period is aborted. Never triggers
    /// the reconnect path.
    pub async fn disconnect(&self) {
        let supervisor = self.shared.supervisor.lock().take();
        {
            let mut link = self.shared.link.write();
            if let Some(supervisor) = &supervisor {
                supervisor.token.cancel();
            }
            link.state = ConnectionState::Disconnected;
            link.outbound = None;
        }
        self.shared.reconnect_pending.store(false, Ordering::SeqCst);

        if let Some(Supervisor { mut handle, .. }) = supervisor {
            match tokio::time::timeout(SUPERVISOR_GRACE, &mut handle).await {
                Ok(Err(e)) if e.is_panic() => error!(?e, "Connection supervisor panicked"),
                Ok(_) => {}
                Err(_) => {
                    warn!(
                        grace_ms = SUPERVISOR_GRACE.as_millis() as u64,
                        "Connection supervisor did not stop, aborting"
                    );
                    handle.abort();
                }
            }
            info!("Feed disconnected");
        }
    }

    /// Send a control frame.
    ///
    /// Transmits only while connected. Otherwise, or when the session's
    /// outbound queue is full, the frame is dropped without error; callers
    /// needing at-least-once delivery re-issue after reconnect.
    pub fn send(&self, frame: &ClientFrame) {
        let link = self.shared.link.read();
        let outbound = match (&link.state, &link.outbound) {
            (ConnectionState::Connected, Some(outbound)) => outbound,
            _ => {
                debug!(kind = frame.kind(), "Dropping frame while not connected");
                return;
            }
        };

        match frame.to_text() {
            Ok(text) => match outbound.try_send(text) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(kind = frame.kind(), "Outbound queue full, frame dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(kind = frame.kind(), "Session closing, frame dropped");
                }
            },
            Err(e) => warn!(error = %e, "Failed to encode frame"),
        }
    }

    /// Check if the connection is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.link.read().state
    }

    /// Check if a reconnect attempt is scheduled.
    pub fn is_reconnect_pending(&self) -> bool {
        self.shared.reconnect_pending.load(Ordering::SeqCst)
    }

    /// Delay the next failure would wait.
    pub fn current_backoff(&self) -> Duration {
        self.shared.backoff.lock().peek()
    }

    /// Most recent connection error.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.read().clone()
    }

    /// Single-slot frame callbacks.
    pub fn handlers(&self) -> &FrameHandlers {
        &self.shared.handlers
    }

    /// Register the set replayed on every successful connect.
    pub fn set_replay_source(&self, source: Arc<dyn ReplaySource>) {
        *self.shared.replay_source.write() = Some(source);
    }

    /// Get connection statistics.
    pub fn stats(&self) -> ConnectionStats {
        let c = &self.shared.counters;
        ConnectionStats {
            connect_attempts: c.connect_attempts.load(Ordering::Relaxed),
            connects: c.connects.load(Ordering::Relaxed),
            reconnects_scheduled: c.reconnects_scheduled.load(Ordering::Relaxed),
            frames_received: c.frames_received.load(Ordering::Relaxed),
            frames_dropped: c.frames_dropped.load(Ordering::Relaxed),
            pings_sent: c.pings_sent.load(Ordering::Relaxed),
            pongs_received: c.pongs_received.load(Ordering::Relaxed),
            heartbeat: self.shared.heartbeat.stats(),
        }
    }

    /// Parse and dispatch one inbound text frame as the live session would.
    pub fn handle_text(&self, text: &str) {
        self.shared.handle_text(text);
    }
}

impl FeedLink for ConnectionManager {
    fn connect(&self) -> WsResult<()> {
        ConnectionManager::connect(self)
    }

    fn send(&self, frame: &ClientFrame) {
        ConnectionManager::send(self, frame)
    }

    fn is_connected(&self) -> bool {
        ConnectionManager::is_connected(self)
    }

    fn set_replay_source(&self, source: Arc<dyn ReplaySource>) {
        ConnectionManager::set_replay_source(self, source)
    }

    fn handlers(&self) -> &FrameHandlers {
        ConnectionManager::handlers(self)
    }

    fn last_error(&self) -> Option<String> {
        ConnectionManager::last_error(self)
    }
}

impl Shared {
    /// Set state unless the owning supervisor was cancelled. Returns false
    /// if cancelled.
    fn transition(&self, token: &CancellationToken, state: ConnectionState) -> bool {
        let mut link = self.link.write();
        if token.is_cancelled() {
            return false;
        }
        link.state = state;
        if state != ConnectionState::Connected {
            link.outbound = None;
        }
        true
    }

    /// Mark the session connected and collect the replay set atomically
    /// with respect to registry updates. `None` if cancelled meanwhile.
    fn mark_connected(
        &self,
        token: &CancellationToken,
        outbound: mpsc::Sender<String>,
    ) -> Option<Vec<String>> {
        let source = self.replay_source.read().clone();
        let mut installed = false;
        let mut mark = || {
            let mut link = self.link.write();
            if token.is_cancelled() {
                return;
            }
            link.state = ConnectionState::Connected;
            link.outbound = Some(outbound.clone());
            *self.last_error.write() = None;
            installed = true;
        };

        let symbols = match source {
            Some(source) => source.replay_on_connect(&mut mark),
            None => {
                mark();
                Vec::new()
            }
        };
        installed.then_some(symbols)
    }

    fn record_error(&self, e: &WsError) {
        *self.last_error.write() = Some(e.to_string());
    }

    fn handle_text(&self, text: &str) {
        Counters::bump(&self.counters.frames_received);

        let Some(frame) = FeedFrame::parse(text) else {
            Counters::bump(&self.counters.frames_dropped);
            return;
        };

        match &frame {
            FeedFrame::Pong => {
                Counters::bump(&self.counters.pongs_received);
                self.heartbeat.record_pong();
            }
            FeedFrame::Subscribed { symbols } => {
                debug!(?symbols, "Subscription acknowledged");
            }
            _ => self.handlers.dispatch(&frame),
        }
    }
}

async fn run_supervisor(shared: Arc<Shared>, token: CancellationToken) {
    loop {
        if !shared.transition(&token, ConnectionState::Connecting) {
            break;
        }
        Counters::bump(&shared.counters.connect_attempts);

        let e = match run_session(&shared, &token).await {
            SessionEnd::Cancelled => break,
            SessionEnd::Failed(e) => e,
        };

        if !shared.transition(&token, ConnectionState::Disconnected) {
            break;
        }
        shared.record_error(&e);

        let delay = shared.backoff.lock().next_delay();
        Counters::bump(&shared.counters.reconnects_scheduled);
        // Registered before the flag is raised so connect() cannot miss it.
        let retry_now = shared.retry_now.notified();
        shared.reconnect_pending.store(true, Ordering::SeqCst);
        warn!(error = %e, delay_ms = delay.as_millis() as u64, "Feed connection lost, reconnecting");

        tokio::select! {
            biased;
            () = token.cancelled() => {
                info!("Disconnect requested during backoff");
                break;
            }
            () = retry_now => debug!("Reconnect requested, skipping backoff"),
            () = tokio::time::sleep(delay) => {}
        }
        shared.reconnect_pending.store(false, Ordering::SeqCst);
    }
    shared.reconnect_pending.store(false, Ordering::SeqCst);
    debug!("Connection supervisor exited");
}

async fn run_session(shared: &Shared, token: &CancellationToken) -> SessionEnd {
    let url = shared.config.url.as_str();
    info!(%url, "Connecting to feed");

    let open_timeout = Duration::from_millis(shared.config.open_timeout_ms);
    let open = tokio::time::timeout(
        open_timeout,
        // TCP_NODELAY: control frames are tiny and latency-sensitive
        connect_async_tls_with_config(url, None, true, None),
    );

    let ws_stream = tokio::select! {
        biased;
        () = token.cancelled() => return SessionEnd::Cancelled,
        result = open => match result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                warn!(error = %e, "Feed open failed");
                return SessionEnd::Failed(e.into());
            }
            Err(_) => {
                warn!(timeout_ms = shared.config.open_timeout_ms, "Feed open timed out");
                return SessionEnd::Failed(WsError::ConnectionFailed(format!(
                    "open timed out after {}ms",
                    shared.config.open_timeout_ms
                )));
            }
        },
    };
    let (mut write, mut read) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    let write_timeout = Duration::from_millis(shared.config.write_timeout_ms);

    shared.backoff.lock().reset();
    shared.heartbeat.reset();
    let Some(replay) = shared.mark_connected(token, outbound_tx) else {
        let _ = tokio::time::timeout(CLOSE_GRACE, write.send(Message::Close(None))).await;
        return SessionEnd::Cancelled;
    };
    Counters::bump(&shared.counters.connects);
    info!(replayed = replay.len(), "Feed connected");

    // Written before draining the outbound queue so anything the registry
    // queued after the transition goes out behind the replay.
    if !replay.is_empty() {
        let frame = ClientFrame::subscribe(replay);
        match frame.to_text() {
            Ok(text) => {
                if let Err(end) =
                    write_frame(&mut write, token, write_timeout, Message::Text(text)).await
                {
                    return end;
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode replay frame"),
        }
    }

    let interval = shared.heartbeat.interval();
    let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            () = token.cancelled() => {
                debug!("Closing feed connection");
                let _ = tokio::time::timeout(CLOSE_GRACE, write.send(Message::Close(None))).await;
                return SessionEnd::Cancelled;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => shared.handle_text(&text),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(end) =
                            write_frame(&mut write, token, write_timeout, Message::Pong(data)).await
                        {
                            return end;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((1000, "Normal close".to_string()));
                        warn!(code, %reason, "Feed closed by server");
                        return SessionEnd::Failed(WsError::ConnectionClosed { code, reason });
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "Feed read error");
                        return SessionEnd::Failed(e.into());
                    }
                    None => {
                        warn!("Feed stream ended");
                        return SessionEnd::Failed(WsError::ConnectionClosed {
                            code: 1006,
                            reason: "stream ended".to_string(),
                        });
                    }
                }
            }

            outbound = outbound_rx.recv() => {
                let Some(text) = outbound else {
                    // Link torn down by disconnect()
                    return SessionEnd::Cancelled;
                };
                if let Err(end) =
                    write_frame(&mut write, token, write_timeout, Message::Text(text)).await
                {
                    return end;
                }
            }

            _ = heartbeat.tick() => {
                match ClientFrame::Ping.to_text() {
                    Ok(text) => {
                        if let Err(end) =
                            write_frame(&mut write, token, write_timeout, Message::Text(text)).await
                        {
                            return end;
                        }
                        shared.heartbeat.record_ping();
                        Counters::bump(&shared.counters.pings_sent);
                    }
                    Err(e) => warn!(error = %e, "Failed to encode ping"),
                }
            }
        }
    }
}

/// Write one frame to the session.
///
/// Gives up as soon as the session is cancelled, and fails the session when
/// the peer stops draining its socket for longer than `timeout`.
async fn write_frame<S>(
    write: &mut S,
    token: &CancellationToken,
    timeout: Duration,
    message: Message,
) -> Result<(), SessionEnd>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(SessionEnd::Cancelled),
        result = tokio::time::timeout(timeout, write.send(message)) => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionEnd::Failed(WsError::SendFailed(e.to_string()))),
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Feed write stalled");
                Err(SessionEnd::Failed(WsError::SendFailed(format!(
                    "write stalled for {}ms",
                    timeout.as_millis()
                ))))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use pulse_core::MarketStatus;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.backoff_floor_ms, 1000);
        assert_eq!(config.heartbeat_interval_ms, 30_000);
        assert_eq!(config.write_timeout_ms, 10_000);
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("ws://localhost:8001/api/ws/prices").is_ok());
        assert!(validate_endpoint("wss://api.example.com/api/ws/prices").is_ok());

        for bad in ["", "   ", "not a url", "http://example.com/ws", "ws://"] {
            assert!(
                matches!(validate_endpoint(bad), Err(WsError::InvalidEndpoint(_))),
                "should reject {bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_connect_with_invalid_endpoint_starts_nothing() {
        let manager = ConnectionManager::new(ConnectionConfig::new("http://example.com"));

        let err = manager.connect().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.last_error().is_some());
        assert_eq!(manager.stats().connect_attempts, 0);
    }

    #[test]
    fn test_send_while_disconnected_is_silent() {
        let manager = ConnectionManager::new(ConnectionConfig::new("ws://127.0.0.1:1"));
        manager.send(&ClientFrame::subscribe(["ACME"]));
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_handle_text_counts_and_dispatches() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let s = seen.clone();
        manager
            .handlers()
            .on_market_status(Arc::new(move |status| s.lock().push(status)));

        manager.handle_text(r#"{"type":"market_status","data":{"status":"open"}}"#);
        manager.handle_text("garbage");
        manager.handle_text(r#"{"type":"pong"}"#);

        let stats = manager.stats();
        assert_eq!(stats.frames_received, 3);
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.pongs_received, 1);
        assert_eq!(*seen.lock(), vec![MarketStatus::Open]);
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_is_noop() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
