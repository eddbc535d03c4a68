//! Chat line protocol
//!
//! Every frame on the wire is one UTF-8 line terminated by `\n`. Two framings
//! are supported on top of that:
//!
//! - `plain`: lines are opaque and relayed verbatim. Notices look like
//!   `* client-3 joined`.
//! - `tagged`: clients register with `NAME:<name>` and send chat text as
//!   `MSG:<text>`. The server relays `FROM:<name>:<text>` and emits notices
//!   as `SYS:<text>`.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub const MSG_PREFIX: &str = "MSG:";
pub const NAME_PREFIX: &str = "NAME:";
pub const FROM_PREFIX: &str = "FROM:";
pub const SYS_PREFIX: &str = "SYS:";

/// Display names are capped so a `FROM:` header stays readable
pub const MAX_NAME_CHARS: usize = 32;

/// Line framing spoken between clients and the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ChatProtocol {
    /// Opaque lines, relayed verbatim
    #[default]
    Plain,
    /// `NAME:` / `MSG:` from clients, `FROM:` / `SYS:` from the server
    Tagged,
}

/// Line received from a client in tagged mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine<'a> {
    /// `NAME:<name>` registration
    Name(&'a str),
    /// `MSG:<text>` chat message
    Message(&'a str),
    /// Anything else
    Unknown(&'a str),
}

impl<'a> ClientLine<'a> {
    /// Parse a tagged client line; payloads are trimmed
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if let Some(name) = line.strip_prefix(NAME_PREFIX) {
            Self::Name(name.trim())
        } else if let Some(text) = line.strip_prefix(MSG_PREFIX) {
            Self::Message(text.trim())
        } else {
            Self::Unknown(line)
        }
    }
}

/// Line received from the server, as seen by a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// Server notice
    System(String),
    /// Chat message relayed from another client
    From { sender: String, content: String },
    /// Unframed line
    Raw(String),
}

impl ServerLine {
    /// Parse a line received from the server
    ///
    /// In plain mode every line is `Raw`. In tagged mode a malformed `FROM:`
    /// line is surfaced as a system line rather than dropped.
    pub fn parse(protocol: ChatProtocol, line: &str) -> Self {
        if protocol == ChatProtocol::Plain {
            return Self::Raw(line.to_string());
        }

        let line = line.trim();
        if let Some(text) = line.strip_prefix(SYS_PREFIX) {
            return Self::System(text.trim().to_string());
        }
        if let Some(rest) = line.strip_prefix(FROM_PREFIX) {
            return match rest.split_once(':') {
                Some((sender, content)) => Self::From {
                    sender: sender.trim().to_string(),
                    content: content.trim().to_string(),
                },
                None => Self::System(line.to_string()),
            };
        }
        Self::Raw(line.to_string())
    }
}

impl ChatProtocol {
    /// Line the server relays for a chat message
    pub fn relay(self, sender: &str, text: &str) -> String {
        match self {
            Self::Plain => text.to_string(),
            Self::Tagged => format!("{}{}:{}", FROM_PREFIX, sender, text),
        }
    }

    /// Server notice line
    pub fn system(self, text: &str) -> String {
        match self {
            Self::Plain => format!("* {}", text),
            Self::Tagged => format!("{}{}", SYS_PREFIX, text),
        }
    }

    pub fn join_notice(self, name: &str) -> String {
        self.system(&format!("{} joined", name))
    }

    pub fn leave_notice(self, name: &str) -> String {
        self.system(&format!("{} left", name))
    }

    /// Handshake a client sends right after connecting, if any
    pub fn handshake(self, name: &str) -> Option<String> {
        match self {
            Self::Plain => None,
            Self::Tagged => Some(format!("{}{}", NAME_PREFIX, name)),
        }
    }

    /// Frame a line typed by a client user
    pub fn outgoing(self, text: &str) -> String {
        match self {
            Self::Plain => text.to_string(),
            Self::Tagged => format!("{}{}", MSG_PREFIX, text),
        }
    }
}

impl std::fmt::Display for ChatProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Tagged => write!(f, "tagged"),
        }
    }
}

/// Make a client-chosen name safe to embed in a `FROM:` header
///
/// `:` separates the header from the text, so it is replaced. Control
/// characters are dropped and the result is capped at `MAX_NAME_CHARS`.
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == ':' { '_' } else { c })
        .take(MAX_NAME_CHARS)
        .collect()
}
