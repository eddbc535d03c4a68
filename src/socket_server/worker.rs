//! Per-client receive worker
//!
//! One worker runs per connected client. It reads that client's lines in
//! order and broadcasts each one before reading the next, which is what
//! keeps every sender's messages in FIFO order for all recipients.
//!
//! Whatever ends the session (end of stream, read error, protocol
//! violation, idle timeout, or a close from elsewhere) funnels into a
//! single cleanup step that runs exactly once.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::ChatError;
use crate::socket_server::broadcast::Broadcaster;
use crate::socket_server::connection::{ConnectionHandle, LineReader};
use crate::socket_server::protocol::{sanitize_name, ChatProtocol, ClientLine};
use crate::socket_server::registry::ClientId;

/// Why a client session ended
#[derive(Debug)]
pub enum DisconnectReason {
    /// Peer closed the connection
    EndOfStream,
    /// Socket error while reading
    ReadError(ChatError),
    /// Line too long or not UTF-8
    ProtocolError(ChatError),
    /// Handle closed elsewhere (failed send, shutdown)
    Closed,
    /// No input within the configured idle timeout
    IdleTimeout,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfStream => write!(f, "end of stream"),
            Self::ReadError(e) => write!(f, "read error: {}", e),
            Self::ProtocolError(e) => write!(f, "protocol error: {}", e),
            Self::Closed => write!(f, "connection closed"),
            Self::IdleTimeout => write!(f, "idle timeout"),
        }
    }
}

/// Worker behaviour shared by every client of one server
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub protocol: ChatProtocol,
    pub announce: bool,
    pub idle_timeout: Option<Duration>,
}

impl From<&ServerConfig> for WorkerOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            protocol: config.protocol,
            announce: config.announce,
            idle_timeout: config.idle_timeout(),
        }
    }
}

/// Reads one client's lines and relays them to everyone else
pub struct ReceiveWorker<R> {
    handle: Arc<ConnectionHandle>,
    reader: LineReader<R>,
    writer: Option<JoinHandle<()>>,
    broadcaster: Broadcaster,
    options: WorkerOptions,
    /// Plain clients are registered from the start, tagged ones after `NAME:`
    registered: bool,
}

impl<R> ReceiveWorker<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(
        handle: Arc<ConnectionHandle>,
        reader: LineReader<R>,
        writer: Option<JoinHandle<()>>,
        broadcaster: Broadcaster,
        options: WorkerOptions,
    ) -> Self {
        let registered = options.protocol == ChatProtocol::Plain;
        Self {
            handle,
            reader,
            writer,
            broadcaster,
            options,
            registered,
        }
    }

    pub fn id(&self) -> ClientId {
        self.handle.id()
    }

    /// Run until the session ends, then clean up
    pub async fn run(mut self) -> DisconnectReason {
        let handle = Arc::clone(&self.handle);

        let reason = loop {
            let received = tokio::select! {
                biased;

                _ = handle.closed() => break DisconnectReason::Closed,
                received = receive(&mut self.reader, self.options.idle_timeout) => received,
            };

            match received {
                Ok(line) => self.handle_line(&line),
                Err(reason) => break reason,
            }
        };

        self.cleanup(&reason).await;
        reason
    }

    fn handle_line(&mut self, line: &str) {
        let id = self.handle.id();

        match self.options.protocol {
            ChatProtocol::Plain => {
                if line.is_empty() {
                    return;
                }
                tracing::debug!("{}: {}", id, line);
                self.broadcaster.broadcast(id, line);
            }
            ChatProtocol::Tagged => match ClientLine::parse(line) {
                ClientLine::Name(name) if !self.registered => self.register(name),
                ClientLine::Name(_) => {
                    tracing::debug!("{} tried to rename, ignoring", id);
                }
                ClientLine::Message(text) if self.registered => {
                    if text.is_empty() {
                        return;
                    }
                    let name = self.handle.display_name();
                    tracing::debug!("{}: {}", name, text);
                    let relay = self.options.protocol.relay(&name, text);
                    self.broadcaster.broadcast(id, &relay);
                }
                ClientLine::Message(_) => {
                    tracing::debug!("{} sent a message before NAME:, ignoring", id);
                }
                ClientLine::Unknown(other) => {
                    tracing::debug!("{} sent unrecognized line: {:?}", id, other);
                }
            },
        }
    }

    fn register(&mut self, requested: &str) {
        let mut name = sanitize_name(requested);
        if name.is_empty() {
            // Peer address contains ':', which the FROM header reserves
            name = sanitize_name(&self.handle.peer_addr().to_string());
        }

        tracing::info!("{} registered as {}", self.handle.id(), name);
        self.handle.set_name(name.clone());
        self.registered = true;

        if self.options.announce {
            let notice = self.options.protocol.join_notice(&name);
            self.broadcaster.announce(self.handle.id(), &notice);
        }
    }

    async fn cleanup(&mut self, reason: &DisconnectReason) {
        let id = self.handle.id();

        // Remove before closing so no broadcast can pick up a closed handle
        self.broadcaster.registry().remove(id);
        self.handle.close();

        match reason {
            DisconnectReason::EndOfStream | DisconnectReason::Closed => {
                tracing::info!("{} ({}) disconnected: {}", id, self.handle.peer_addr(), reason)
            }
            _ => tracing::warn!("{} ({}) disconnected: {}", id, self.handle.peer_addr(), reason),
        }

        if self.options.announce && self.registered {
            let notice = self.options.protocol.leave_notice(&self.handle.display_name());
            self.broadcaster.announce(id, &notice);
        }

        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
    }
}

/// Next line, or the reason there will be no more
async fn receive<R>(
    reader: &mut LineReader<R>,
    idle_timeout: Option<Duration>,
) -> Result<String, DisconnectReason>
where
    R: AsyncRead + Unpin,
{
    let result = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, reader.receive_line()).await {
            Ok(result) => result,
            Err(_) => return Err(DisconnectReason::IdleTimeout),
        },
        None => reader.receive_line().await,
    };

    match result {
        Ok(Some(line)) => Ok(line),
        Ok(None) => Err(DisconnectReason::EndOfStream),
        Err(e) if e.is_protocol_error() => Err(DisconnectReason::ProtocolError(e)),
        Err(e) => Err(DisconnectReason::ReadError(e)),
    }
}
