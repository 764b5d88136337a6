//! Feed link trait.
//!
//! Abstracts the connection manager as seen by the subscription registry,
//! allowing for:
//! - Unit testing the registry and adapters with `MockFeedLink`
//! - Swapping the transport without touching the routing layer

use crate::error::{WsError, WsResult};
use crate::handlers::FrameHandlers;
use crate::message::{ClientFrame, FeedFrame};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Source of the full wanted-symbol set replayed on every (re)connect.
pub trait ReplaySource: Send + Sync {
    /// Run `mark_connected` while the wanted set is held stable and return
    /// that set.
    ///
    /// Holding the set across the transition guarantees a newly wanted
    /// symbol is covered either by this replay or by a subscribe frame sent
    /// after the link reports connected, never both and never neither.
    fn replay_on_connect(&self, mark_connected: &mut dyn FnMut()) -> Vec<String>;
}

/// Control surface of the single feed connection.
pub trait FeedLink: Send + Sync {
    /// Start connecting. No-op if already connected or connecting.
    ///
    /// Only configuration problems are returned as errors.
    fn connect(&self) -> WsResult<()>;

    /// Send a control frame if connected; silently dropped otherwise.
    fn send(&self, frame: &ClientFrame);

    /// Current connection state.
    fn is_connected(&self) -> bool;

    /// Register the set replayed on every successful connect.
    fn set_replay_source(&self, source: Arc<dyn ReplaySource>);

    /// Single-slot frame callbacks.
    fn handlers(&self) -> &FrameHandlers;

    /// Most recent connection error, for diagnostics.
    fn last_error(&self) -> Option<String>;
}

/// Mock feed link for testing.
///
/// Records every frame that would have reached the wire. `connect()` only
/// counts the call unless auto-open is enabled; tests drive the session
/// with `open()`, `drop_connection()` and `inject()`.
#[derive(Default)]
pub struct MockFeedLink {
    connected: AtomicBool,
    auto_open: AtomicBool,
    connect_calls: AtomicUsize,
    sent: Mutex<Vec<ClientFrame>>,
    invalid_endpoint: Mutex<Option<String>>,
    last_error: Mutex<Option<String>>,
    replay_source: RwLock<Option<Arc<dyn ReplaySource>>>,
    handlers: FrameHandlers,
}

impl MockFeedLink {
    /// Create a new mock link in the disconnected state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the session as soon as `connect()` is called.
    pub fn with_auto_open(self) -> Self {
        self.auto_open.store(true, Ordering::SeqCst);
        self
    }

    /// Make `connect()` fail with an invalid endpoint error.
    pub fn set_invalid_endpoint(&self, reason: &str) {
        *self.invalid_endpoint.lock() = Some(reason.to_string());
    }

    /// Simulate a successful (re)connect, replaying the wanted set.
    pub fn open(&self) {
        if self.connected.load(Ordering::SeqCst) {
            return;
        }
        let source = self.replay_source.read().clone();
        let mut mark = || self.connected.store(true, Ordering::SeqCst);
        let replay = match source {
            Some(source) => source.replay_on_connect(&mut mark),
            None => {
                mark();
                Vec::new()
            }
        };
        if !replay.is_empty() {
            self.sent.lock().push(ClientFrame::subscribe(replay));
        }
        debug!("Mock link opened");
    }

    /// Simulate an unplanned close.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *self.last_error.lock() = Some("connection dropped".to_string());
    }

    /// Feed an inbound text frame through parsing and dispatch.
    pub fn inject(&self, text: &str) {
        if let Some(frame) = FeedFrame::parse(text) {
            self.handlers.dispatch(&frame);
        }
    }

    /// Frames sent so far.
    pub fn sent_frames(&self) -> Vec<ClientFrame> {
        self.sent.lock().clone()
    }

    /// Drain recorded frames.
    pub fn take_sent(&self) -> Vec<ClientFrame> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Number of `connect()` calls.
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

impl FeedLink for MockFeedLink {
    fn connect(&self) -> WsResult<()> {
        if let Some(reason) = self.invalid_endpoint.lock().clone() {
            *self.last_error.lock() = Some(reason.clone());
            return Err(WsError::InvalidEndpoint(reason));
        }
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.auto_open.load(Ordering::SeqCst) {
            self.open();
        }
        Ok(())
    }

    fn send(&self, frame: &ClientFrame) {
        if self.connected.load(Ordering::SeqCst) {
            self.sent.lock().push(frame.clone());
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_replay_source(&self, source: Arc<dyn ReplaySource>) {
        *self.replay_source.write() = Some(source);
    }

    fn handlers(&self) -> &FrameHandlers {
        &self.handlers
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}
