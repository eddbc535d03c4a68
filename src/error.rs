//! Error types and exit codes for chat-relay

use std::process::ExitCode;
use thiserror::Error;

use crate::socket_server::ClientId;

/// Main error type for chat-relay operations
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to accept connection: {0}")]
    Accept(std::io::Error),

    #[error("Failed to connect to {addr}: {message}")]
    Connect { addr: String, message: String },

    #[error("Line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("Line is not valid UTF-8")]
    InvalidEncoding,

    #[error("Connection is closed")]
    Closed,

    #[error("Outbox full for {client}, dropping slow consumer")]
    SlowConsumer { client: ClientId },

    #[error("Write timed out")]
    WriteTimeout,

    #[error("Client id {0} is already registered")]
    DuplicateId(ClientId),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ChatError {
    /// Protocol violations that end a client's session
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::LineTooLong { .. } | Self::InvalidEncoding)
    }

    /// Convert error to an exit code:
    /// - 1: IO / network error
    /// - 2: Configuration error
    /// - 3: Protocol error
    /// - 4: Internal invariant violation
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) | Self::Accept(_) | Self::Closed | Self::WriteTimeout => ExitCode::from(1),
            Self::Bind { .. } | Self::Connect { .. } => ExitCode::from(1),
            Self::Config { .. } => ExitCode::from(2),
            Self::LineTooLong { .. } | Self::InvalidEncoding => ExitCode::from(3),
            Self::SlowConsumer { .. } => ExitCode::from(1),
            Self::DuplicateId(_) => ExitCode::from(4),
        }
    }

    pub(crate) fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }
}

/// Result type alias for chat-relay operations
pub type Result<T> = std::result::Result<T, ChatError>;
