//! Live-log WebSocket controller.
//!
//! One [`LiveLogConnection`] per viewer. The connection only changes state
//! on an explicit [`connect`](LiveLogConnection::connect) or
//! [`disconnect`](LiveLogConnection::disconnect); a dropped transport ends
//! in `Disconnected` and is not retried. The buffer keeps the most recent
//! lines only.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ConsoleError;

/// Lines kept in the buffer unless overridden.
pub const DEFAULT_BUFFER_LINES: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Shared {
    state: ConnectionState,
    buffer: VecDeque<String>,
    buffer_limit: usize,
}

impl Shared {
    fn new(buffer_limit: usize) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            buffer: VecDeque::new(),
            buffer_limit,
        }
    }

    /// Append a line, dropping the oldest once over the limit.
    fn push_line(&mut self, line: String) {
        if self.buffer_limit == 0 {
            return;
        }
        while self.buffer.len() >= self.buffer_limit {
            self.buffer.pop_front();
        }
        self.buffer.push_back(line);
    }
}

pub struct LiveLogConnection {
    url: String,
    shared: Arc<Mutex<Shared>>,
    stop: Option<oneshot::Sender<()>>,
    reader: Option<JoinHandle<()>>,
}

impl LiveLogConnection {
    /// `url` is the live-log endpoint, e.g. `ws://localhost:2626/`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            shared: Arc::new(Mutex::new(Shared::new(DEFAULT_BUFFER_LINES))),
            stop: None,
            reader: None,
        }
    }

    /// Keep at most `lines` received lines. Existing overflow is dropped.
    pub fn with_buffer_limit(self, lines: usize) -> Self {
        {
            let mut shared = self.lock();
            shared.buffer_limit = lines;
            let excess = shared.buffer.len().saturating_sub(lines);
            shared.buffer.drain(..excess);
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock(&self.shared)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// The retained lines received since the last
    /// [`clear_buffer`](Self::clear_buffer), concatenated.
    pub fn buffer(&self) -> String {
        self.lock().buffer.iter().map(String::as_str).collect()
    }

    pub fn clear_buffer(&self) {
        self.lock().buffer.clear();
    }

    /// Open the socket. Received lines are appended to the buffer and
    /// forwarded on the returned channel until the connection ends.
    pub async fn connect(&mut self) -> Result<mpsc::UnboundedReceiver<String>, ConsoleError> {
        {
            let mut shared = self.lock();
            match shared.state {
                ConnectionState::Disconnected => shared.state = ConnectionState::Connecting,
                other => return Err(ConsoleError::AlreadyActive(other.as_str())),
            }
        }
        tracing::info!(url = %self.url, "Connecting to live log");

        let stream = match connect_async(self.url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "Live log connection failed");
                self.lock().state = ConnectionState::Disconnected;
                return Err(e.into());
            }
        };
        self.lock().state = ConnectionState::Connected;
        tracing::info!("Live log connected");

        let (lines_tx, lines_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        self.reader = Some(tokio::spawn(read_loop(stream, shared, lines_tx, stop_rx)));
        self.stop = Some(stop_tx);
        Ok(lines_rx)
    }

    /// Close the socket. A no-op when already disconnected.
    pub async fn disconnect(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
        self.lock().state = ConnectionState::Disconnected;
    }

    /// Connect when disconnected, disconnect otherwise.
    pub async fn toggle(&mut self) -> Result<Option<mpsc::UnboundedReceiver<String>>, ConsoleError> {
        if self.state() == ConnectionState::Disconnected {
            self.connect().await.map(Some)
        } else {
            self.disconnect().await;
            Ok(None)
        }
    }
}

impl Drop for LiveLogConnection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

type Stream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn read_loop(
    stream: Stream,
    shared: Arc<Mutex<Shared>>,
    lines: mpsc::UnboundedSender<String>,
    mut stop: oneshot::Receiver<()>,
) {
    let (mut sink, mut stream) = stream.split();

    loop {
        tokio::select! {
            _ = &mut stop => {
                let _ = sink.send(Message::Close(None)).await;
                tracing::info!("Live log disconnected");
                break;
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let text = text.to_string();
                    lock(&shared).push_line(text.clone());
                    let _ = lines.send(text);
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Server closed live log");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Live log transport error");
                    break;
                }
                None => break,
            },
        }
    }

    lock(&shared).state = ConnectionState::Disconnected;
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
