//! Chat Socket Server
//!
//! A TCP server that relays every line received from one client to all other
//! connected clients, forming a single shared chat room.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CHAT SOCKET SERVER                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ChatServer (listener task)                                             │
//! │    accept ──► Connection::from_tcp ──► ClientRegistry::add              │
//! │           └─► spawn ReceiveWorker                                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              ClientRegistry (Arc, RwLock<BTreeMap>)             │   │
//! │  │                                                                 │   │
//! │  │  client-1 ──► ConnectionHandle { outbox ──► writer task }       │   │
//! │  │  client-2 ──► ConnectionHandle { outbox ──► writer task }       │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ReceiveWorker per client                                               │
//! │    LineReader ──► Broadcaster::broadcast(sender, line)                  │
//! │                     └─► snapshot_excluding(sender) ──► send_line        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - A line is never echoed back to its sender.
//! - Lines from one sender reach every recipient in the order they were sent.
//! - `send_line` only queues, so a slow or dead recipient never stalls the
//!   sender or other recipients. A recipient whose queue overflows, or whose
//!   socket fails, is dropped as if it had disconnected.
//! - The registry only ever holds open connections.
//!
//! # Protocol
//!
//! Newline-delimited UTF-8. See [`protocol`] for the plain and tagged framings.

pub mod broadcast;
pub mod connection;
pub mod listener;
pub mod protocol;
pub mod registry;
pub mod worker;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use connection::{Connection, ConnectionHandle, ConnectionSettings, LineReader};
pub use listener::{ChatServer, ListenerState, ShutdownHandle};
pub use protocol::{ChatProtocol, ClientLine, ServerLine};
pub use registry::{ClientId, ClientRegistry};
pub use worker::{DisconnectReason, ReceiveWorker, WorkerOptions};
