//! Mock price feed server for integration tests.
//!
//! Provides a WebSocket server that can:
//! - Accept connections and count them
//! - Record received text frames
//! - Answer `ping` actions with `pong`
//! - Push frames to, or drop, every live session
//!
//! `StalledFeedServer` completes the handshake and then never reads, so
//! the client's socket fills up.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

enum Control {
    Push(String),
    Drop,
}

#[derive(Default)]
struct ServerState {
    messages: Mutex<Vec<String>>,
    connections: AtomicU32,
    sessions: Mutex<Vec<mpsc::UnboundedSender<Control>>>,
}

/// A mock feed server for testing.
pub struct MockFeedServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    state: Arc<ServerState>,
}

impl MockFeedServer {
    /// Start a new mock feed server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let state_clone = state.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(stream, state_clone.clone()));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            state,
        }
    }

    /// Get the server's WebSocket URL.
    pub fn url(&self) -> String {
        format!("ws://{}/api/ws/prices", self.addr)
    }

    /// Get the number of connections received.
    pub fn connection_count(&self) -> u32 {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Number of sessions that completed the handshake and are still open.
    pub fn live_sessions(&self) -> usize {
        self.state.sessions.lock().iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Get all received text frames as JSON.
    pub fn received(&self) -> Vec<serde_json::Value> {
        self.state
            .messages
            .lock()
            .iter()
            .filter_map(|m| serde_json::from_str(m).ok())
            .collect()
    }

    /// Received frames with the given `action`.
    pub fn received_actions(&self, action: &str) -> Vec<serde_json::Value> {
        self.received()
            .into_iter()
            .filter(|v| v["action"] == action)
            .collect()
    }

    /// Send a text frame to every live session.
    pub fn push(&self, text: impl Into<String>) {
        let text = text.into();
        self.state
            .sessions
            .lock()
            .retain(|tx| tx.send(Control::Push(text.clone())).is_ok());
    }

    /// Close every live session from the server side.
    pub fn drop_sessions(&self) {
        for tx in self.state.sessions.lock().drain(..) {
            let _ = tx.send(Control::Drop);
        }
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// A feed that accepts sessions and never reads from them.
pub struct StalledFeedServer {
    addr: SocketAddr,
    connections: Arc<AtomicU32>,
    task: JoinHandle<()>,
}

impl StalledFeedServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicU32::new(0));

        let counter = connections.clone();
        let task = tokio::spawn(async move {
            // Sessions are held open, unread, until shutdown.
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Ok(ws) = accept_async(stream).await {
                    held.push(ws);
                }
            }
        });

        Self {
            addr,
            connections,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/api/ws/prices", self.addr)
    }

    pub fn connection_count(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<ServerState>) {
    state.connections.fetch_add(1, Ordering::SeqCst);

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (control_tx, mut control_rx) = mpsc::unbounded_channel();
    state.sessions.lock().push(control_tx);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    state.messages.lock().push(text.clone());

                    let is_ping = serde_json::from_str::<serde_json::Value>(&text)
                        .map(|v| v["action"] == "ping")
                        .unwrap_or(false);
                    if is_ping {
                        let pong = serde_json::json!({"type": "pong"}).to_string();
                        let _ = write.send(Message::Text(pong)).await;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            control = control_rx.recv() => match control {
                Some(Control::Push(text)) => {
                    let _ = write.send(Message::Text(text)).await;
                }
                Some(Control::Drop) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockFeedServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
