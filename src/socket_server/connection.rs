//! Per-client connection handling
//!
//! A TCP connection is split in two:
//!
//! - [`ConnectionHandle`] owns the write side. It is shared (`Arc`) between
//!   the registry and every worker that broadcasts to this client. Lines are
//!   queued on a bounded outbox and written by a dedicated writer task, so
//!   `send_line` never blocks the caller and concurrent senders are
//!   serialized by the queue.
//! - [`LineReader`] owns the read side and is used only by the client's own
//!   receive worker.
//!
//! The handle moves from open to closed exactly once. Closing wakes both the
//! writer task and anything waiting on [`ConnectionHandle::closed`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::{ChatError, Result};
use crate::socket_server::registry::ClientId;

/// Limits applied to every connection
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub max_line_bytes: usize,
    pub outbox_capacity: usize,
    pub write_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for ConnectionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_line_bytes: config.max_line_bytes,
            outbox_capacity: config.outbox_capacity,
            write_timeout: config.write_timeout(),
        }
    }
}

/// Accepted connection, before it is handed to the registry and a worker
pub struct Connection {
    pub handle: Arc<ConnectionHandle>,
    pub reader: LineReader<OwnedReadHalf>,
    /// Writer task; finishes once the handle is closed and the outbox drained
    pub writer: JoinHandle<()>,
}

impl Connection {
    /// Split an accepted stream into its shared handle and private reader
    pub fn from_tcp(
        stream: TcpStream,
        id: ClientId,
        peer: SocketAddr,
        settings: &ConnectionSettings,
    ) -> Self {
        // Chat lines are small and latency matters more than packet count
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("{}: failed to set TCP_NODELAY: {}", id, e);
        }

        let (read_half, write_half) = stream.into_split();
        let (handle, writer) = ConnectionHandle::spawn(id, peer, write_half, settings);
        let reader = LineReader::new(read_half, settings.max_line_bytes);

        Self {
            handle,
            reader,
            writer,
        }
    }
}

/// Open/closed flag shared by a handle and its writer task
struct CloseSignal {
    tx: watch::Sender<bool>,
}

impl CloseSignal {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Returns true for the call that actually closed
    fn close(&self) -> bool {
        self.tx.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once closed
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Shared, send-side view of one client connection
pub struct ConnectionHandle {
    id: ClientId,
    peer: SocketAddr,
    name: RwLock<Option<String>>,
    outbox: mpsc::Sender<Arc<str>>,
    signal: Arc<CloseSignal>,
}

impl ConnectionHandle {
    /// Create a handle over any writer and start its writer task
    pub fn spawn<W>(
        id: ClientId,
        peer: SocketAddr,
        writer: W,
        settings: &ConnectionSettings,
    ) -> (Arc<Self>, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbox, rx) = mpsc::channel(settings.outbox_capacity);
        let signal = Arc::new(CloseSignal::new());

        let task = tokio::spawn(run_writer(
            id,
            writer,
            rx,
            Arc::clone(&signal),
            settings.write_timeout,
        ));

        let handle = Arc::new(Self {
            id,
            peer,
            name: RwLock::new(None),
            outbox,
            signal,
        });

        (handle, task)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Name registered by the client, if any
    pub fn name(&self) -> Option<String> {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: String) {
        *self.name.write() = Some(name);
    }

    /// Registered name, falling back to the client id
    pub fn display_name(&self) -> String {
        self.name().unwrap_or_else(|| self.id.to_string())
    }

    /// Queue one line for delivery
    ///
    /// Never waits for the socket. A full outbox means the client is not
    /// keeping up; the handle is closed and `SlowConsumer` returned.
    pub fn send_line(&self, line: &str) -> Result<()> {
        if self.is_closed() {
            return Err(ChatError::Closed);
        }

        match self.outbox.try_send(Arc::from(line)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.close();
                Err(ChatError::SlowConsumer { client: self.id })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close();
                Err(ChatError::Closed)
            }
        }
    }

    /// Close the connection; later calls are no-ops
    ///
    /// Returns true if this call performed the transition.
    pub fn close(&self) -> bool {
        let closed = self.signal.close();
        if closed {
            tracing::debug!("{} ({}) closed", self.id, self.peer);
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.signal.is_closed()
    }

    /// Resolves once the handle is closed, by anyone
    pub async fn closed(&self) {
        self.signal.wait().await
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Drain the outbox onto the socket until the handle closes
async fn run_writer<W>(
    id: ClientId,
    mut writer: W,
    mut rx: mpsc::Receiver<Arc<str>>,
    signal: Arc<CloseSignal>,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;

            line = rx.recv() => {
                let Some(line) = line else { break };
                if let Err(e) = write_line(&mut writer, &line, write_timeout).await {
                    tracing::debug!("{}: write failed: {}", id, e);
                    signal.close();
                    break;
                }
            }

            _ = signal.wait() => {
                // Flush whatever was queued before the close, best-effort
                let _ = tokio::time::timeout(write_timeout, async {
                    while let Ok(line) = rx.try_recv() {
                        if write_line(&mut writer, &line, write_timeout).await.is_err() {
                            break;
                        }
                    }
                })
                .await;
                break;
            }
        }
    }

    rx.close();
    let _ = tokio::time::timeout(write_timeout, writer.shutdown()).await;
}

async fn write_line<W>(writer: &mut W, line: &str, write_timeout: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = Vec::with_capacity(line.len() + 1);
    frame.extend_from_slice(line.as_bytes());
    frame.push(b'\n');

    match tokio::time::timeout(write_timeout, async {
        writer.write_all(&frame).await?;
        writer.flush().await
    })
    .await
    {
        Ok(result) => result.map_err(ChatError::from),
        Err(_) => Err(ChatError::WriteTimeout),
    }
}

/// Receive side of a connection: reads bounded `\n`-terminated lines
pub struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    max_line_bytes: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::new(),
            max_line_bytes,
        }
    }

    /// Read the next complete line
    ///
    /// Returns `Ok(None)` at end of stream. A trailing fragment without a
    /// newline is discarded. The terminator (`\n` or `\r\n`) is stripped.
    ///
    /// Cancel safe: bytes already taken from the socket stay buffered for the
    /// next call.
    pub async fn receive_line(&mut self) -> Result<Option<String>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if !self.buf.is_empty() {
                    tracing::trace!("discarding {} bytes of unterminated input", self.buf.len());
                    self.buf.clear();
                }
                return Ok(None);
            }

            match available.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.buf.extend_from_slice(&available[..pos]);
                    self.inner.consume(pos + 1);
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                    return self.take_line().map(Some);
                }
                None => {
                    let len = available.len();
                    // Leave room for a `\r` that may precede the next `\n`
                    if self.buf.len().saturating_add(len) > self.max_line_bytes.saturating_add(1) {
                        self.inner.consume(len);
                        self.buf.clear();
                        return Err(ChatError::LineTooLong {
                            limit: self.max_line_bytes,
                        });
                    }
                    self.buf.extend_from_slice(available);
                    self.inner.consume(len);
                }
            }
        }
    }

    fn take_line(&mut self) -> Result<String> {
        let bytes = std::mem::take(&mut self.buf);
        if bytes.len() > self.max_line_bytes {
            return Err(ChatError::LineTooLong {
                limit: self.max_line_bytes,
            });
        }
        String::from_utf8(bytes).map_err(|_| ChatError::InvalidEncoding)
    }
}
