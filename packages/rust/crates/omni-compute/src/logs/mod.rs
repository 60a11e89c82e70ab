//! Live log streaming from the node executing a job.
//!
//! A session is one websocket: open, send the signed subscribe message, then
//! forward frames as [`LogStreamEvent`]s. An abnormal close re-opens the
//! session after a fixed delay until the attempt budget runs out. A normal
//! close, or [`LogStream::close`], ends the stream for good.

mod frame;

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub use frame::{parse_frame, subscribe_message};

use crate::auth::AuthProvider;
use crate::error::{ComputeError, Result};
use crate::node::NodeEndpoints;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_RECONNECT_DELAY_SECS: u64 = 3;
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const EVENT_QUEUE_CAPACITY: usize = 256;

/// Reconnect and timeout knobs for a log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogStreamConfig {
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub connect_timeout: Duration,
}

impl Default for LogStreamConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

/// Event delivered by a [`LogStream`].
#[derive(Debug, Clone, PartialEq)]
pub enum LogStreamEvent {
    /// Structured log record.
    Log(Value),
    /// Frame that was not a structured log record.
    Raw(String),
    /// Error reported by the node or the socket.
    Error(String),
    /// Stream ended; no further events follow.
    Closed,
}

/// Opens log streams against node websocket endpoints.
pub struct LogStreamClient {
    endpoints: NodeEndpoints,
    auth: Arc<AuthProvider>,
    config: LogStreamConfig,
}

impl LogStreamClient {
    pub fn new(endpoints: NodeEndpoints, auth: Arc<AuthProvider>, config: LogStreamConfig) -> Self {
        Self {
            endpoints,
            auth,
            config,
        }
    }

    /// Open a session and send the subscribe message.
    ///
    /// Resolves once the subscription is sent, not once logs arrive. A
    /// connect timeout fails this call and does not trigger reconnection.
    pub async fn connect(&self, node: &str, job_address: &str) -> Result<LogStream> {
        let session = Session {
            url: self.endpoints.ws_url(node),
            job_address: job_address.to_string(),
            auth: Arc::clone(&self.auth),
            config: self.config,
        };
        let socket = session.open().await?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(session.pump(socket, events_tx, shutdown_rx));
        Ok(LogStream {
            events: events_rx,
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Handle to a running log stream.
pub struct LogStream {
    events: mpsc::Receiver<LogStreamEvent>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LogStream {
    /// Next event, `None` once the stream has fully ended.
    pub async fn next_event(&mut self) -> Option<LogStreamEvent> {
        self.events.recv().await
    }

    /// Disable reconnection and tear the socket down.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

enum SessionEnd {
    /// Closed with 1000 or without a status code.
    Normal,
    /// Closed with another code, errored, or dropped without a close frame.
    Abnormal(String),
    /// Caller closed the stream.
    Shutdown,
    /// Event receiver dropped.
    Detached,
}

struct Session {
    url: String,
    job_address: String,
    auth: Arc<AuthProvider>,
    config: LogStreamConfig,
}

impl Session {
    async fn open(&self) -> Result<Socket> {
        let connect = tokio::time::timeout(self.config.connect_timeout, connect_async(self.url.as_str()));
        let (mut socket, _response) = connect
            .await
            .map_err(|_| ComputeError::ConnectionTimeout(self.config.connect_timeout.as_secs()))?
            .map_err(|error| ComputeError::Socket(error.to_string()))?;

        let auth = self.auth.produce().await?;
        let subscribe = subscribe_message(&self.job_address, &auth.identity, &auth.header_value);
        socket
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|error| ComputeError::Socket(error.to_string()))?;
        tracing::debug!(
            event = "compute.logs.subscribed",
            url = %self.url,
            job_address = %self.job_address,
            "log stream subscribed"
        );
        Ok(socket)
    }

    async fn pump(
        self,
        socket: Socket,
        events: mpsc::Sender<LogStreamEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut socket = socket;
        let mut attempts = 0_u32;
        let mut reconnected = false;

        loop {
            let (end, delivered) = forward(&mut socket, &events, &mut shutdown).await;
            if reconnected && delivered {
                attempts = 0;
            }
            match end {
                SessionEnd::Normal => {
                    tracing::info!(
                        event = "compute.logs.closed",
                        job_address = %self.job_address,
                        "log stream closed normally"
                    );
                    break;
                }
                SessionEnd::Shutdown => {
                    let _ = socket.close(None).await;
                    break;
                }
                SessionEnd::Detached => return,
                SessionEnd::Abnormal(reason) => {
                    tracing::warn!(
                        event = "compute.logs.dropped",
                        job_address = %self.job_address,
                        reason = %reason,
                        "log stream dropped"
                    );
                }
            }

            let Some(next) = self.reconnect(&mut attempts, &events, &mut shutdown).await else {
                break;
            };
            socket = next;
            reconnected = true;
        }

        let _ = events.send(LogStreamEvent::Closed).await;
    }

    /// Re-open after an abnormal close. `None` when the budget is spent or the
    /// caller closed the stream while waiting.
    async fn reconnect(
        &self,
        attempts: &mut u32,
        events: &mpsc::Sender<LogStreamEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<Socket> {
        loop {
            if *shutdown.borrow() {
                return None;
            }
            if *attempts >= self.config.max_reconnect_attempts {
                tracing::warn!(
                    event = "compute.logs.reconnect_exhausted",
                    job_address = %self.job_address,
                    attempts = *attempts,
                    "log stream reconnect budget exhausted"
                );
                return None;
            }
            *attempts += 1;

            tokio::select! {
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
                _ = shutdown.changed() => return None,
            }
            match self.open().await {
                Ok(socket) => {
                    tracing::info!(
                        event = "compute.logs.reconnected",
                        job_address = %self.job_address,
                        attempt = *attempts,
                        "log stream reconnected"
                    );
                    return Some(socket);
                }
                Err(error) => {
                    if events
                        .send(LogStreamEvent::Error(error.to_string()))
                        .await
                        .is_err()
                    {
                        return None;
                    }
                }
            }
        }
    }
}

/// Forward frames until the session ends. Also reports whether any frame was delivered.
async fn forward(
    socket: &mut Socket,
    events: &mpsc::Sender<LogStreamEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> (SessionEnd, bool) {
    let mut delivered = false;
    loop {
        if *shutdown.borrow() {
            return (SessionEnd::Shutdown, delivered);
        }
        let message = tokio::select! {
            message = socket.next() => message,
            _ = shutdown.changed() => return (SessionEnd::Shutdown, delivered),
        };
        let event = match message {
            Some(Ok(Message::Text(text))) => parse_frame(&text),
            Some(Ok(Message::Binary(bytes))) => {
                parse_frame(&String::from_utf8_lossy(&bytes))
            }
            Some(Ok(Message::Close(frame))) => return (close_kind(frame.as_ref()), delivered),
            Some(Ok(_)) => continue,
            Some(Err(error)) => {
                let reason = error.to_string();
                if events.send(LogStreamEvent::Error(reason.clone())).await.is_err() {
                    return (SessionEnd::Detached, delivered);
                }
                return (SessionEnd::Abnormal(reason), delivered);
            }
            None => {
                return (
                    SessionEnd::Abnormal("socket ended without a close frame".to_string()),
                    delivered,
                );
            }
        };
        if events.send(event).await.is_err() {
            return (SessionEnd::Detached, delivered);
        }
        delivered = true;
    }
}

fn close_kind(frame: Option<&CloseFrame<'_>>) -> SessionEnd {
    match frame {
        None => SessionEnd::Normal,
        Some(frame) if matches!(frame.code, CloseCode::Normal | CloseCode::Status) => {
            SessionEnd::Normal
        }
        Some(frame) => SessionEnd::Abnormal(format!(
            "close code {} ({})",
            u16::from(frame.code),
            frame.reason
        )),
    }
}
