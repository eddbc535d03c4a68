//! Console chat client
//!
//! Connects to a chat server, performs the protocol handshake and exposes
//! line-level send/receive. Reconnection policy and terminal rendering live
//! here as well; the interactive loop is in `commands::connect`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use console::Style;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::config::ClientConfig;
use crate::error::{ChatError, Result};
use crate::socket_server::protocol::{sanitize_name, ChatProtocol, ServerLine};

// ============================================================================
// Reconnect back-off
// ============================================================================

/// Exponential reconnect delay: base, 2×base, 4×base, ... capped at max
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            Duration::from_secs(config.reconnect_base_delay_secs),
            Duration::from_secs(config.reconnect_max_delay_secs),
        )
    }

    /// Delay to wait now; the following call returns the doubled delay
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Start over after a successful connection
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

// ============================================================================
// Session
// ============================================================================

/// One live connection to the server
pub struct ChatSession {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    protocol: ChatProtocol,
    name: String,
}

impl ChatSession {
    /// Connect and send the handshake (tagged mode)
    pub async fn open(config: &ClientConfig, name: &str) -> Result<Self> {
        let addr = config.server_addr();
        let stream = connect(&addr, config.connect_timeout()).await?;
        let (read_half, write_half) = stream.into_split();

        let mut session = Self {
            lines: BufReader::new(read_half).lines(),
            writer: write_half,
            protocol: config.protocol,
            name: sanitize_name(name),
        };

        if let Some(handshake) = session.protocol.handshake(&session.name) {
            session.write_raw(&handshake).await?;
        }

        tracing::debug!("Connected to {} as {}", addr, session.name);
        Ok(session)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a chat line typed by the user
    pub async fn send(&mut self, text: &str) -> Result<()> {
        let framed = self.protocol.outgoing(text);
        self.write_raw(&framed).await
    }

    /// Next line from the server; `None` once the server hangs up
    pub async fn next_line(&mut self) -> Result<Option<ServerLine>> {
        let line = self.lines.next_line().await?;
        Ok(line.map(|line| ServerLine::parse(self.protocol, &line)))
    }

    async fn write_raw(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Open a TCP connection, giving up after `timeout`
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ChatError::Connect {
            addr: addr.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Err(ChatError::Connect {
            addr: addr.to_string(),
            message: format!("timed out after {:?}", timeout),
        }),
    }
}

/// Name used when the user does not pick one
pub fn default_name() -> String {
    format!("User-{}", chrono::Utc::now().timestamp() % 100_000)
}

// ============================================================================
// Rendering
// ============================================================================

/// Formats server lines for a terminal
pub struct Renderer {
    palette: Vec<Style>,
    timestamps: bool,
}

impl Renderer {
    pub fn new(timestamps: bool) -> Self {
        Self {
            palette: vec![
                Style::new().cyan(),
                Style::new().green(),
                Style::new().magenta(),
                Style::new().yellow(),
                Style::new().blue(),
                Style::new().red(),
            ],
            timestamps,
        }
    }

    /// Stable color for a sender, so each name keeps its color
    pub fn color_for(&self, sender: &str) -> &Style {
        let mut hasher = DefaultHasher::new();
        sender.hash(&mut hasher);
        &self.palette[(hasher.finish() % self.palette.len() as u64) as usize]
    }

    pub fn render(&self, line: &ServerLine) -> String {
        let body = match line {
            ServerLine::System(text) => Style::new()
                .dim()
                .italic()
                .apply_to(format!("-- {}", text))
                .to_string(),
            ServerLine::From { sender, content } => {
                let style = self.color_for(sender).clone().bold();
                format!("{}: {}", style.apply_to(sender), content)
            }
            ServerLine::Raw(text) => text.clone(),
        };

        if self.timestamps {
            format!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), body)
        } else {
            body
        }
    }

    /// Client-side status line ("Connected to chat server", ...)
    pub fn status(&self, text: &str) -> String {
        self.render(&ServerLine::System(text.to_string()))
    }
}
