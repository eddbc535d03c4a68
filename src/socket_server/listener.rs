//! Listener loop
//!
//! Accepts connections, registers them and spawns one receive worker per
//! client. Spawning never waits on the new client, so a slow handshake or a
//! silent peer cannot hold up the next accept.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::ServerConfig;
use crate::error::{ChatError, Result};
use crate::socket_server::broadcast::Broadcaster;
use crate::socket_server::connection::{Connection, ConnectionSettings};
use crate::socket_server::protocol::ChatProtocol;
use crate::socket_server::registry::ClientRegistry;
use crate::socket_server::worker::{DisconnectReason, ReceiveWorker, WorkerOptions};

/// Back-off after a transient accept failure (e.g. descriptor exhaustion)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Listener state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Listening,
    ShuttingDown,
}

/// Requests shutdown of a running [`ChatServer`]; cheap to clone
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Chat server bound to a listening socket
pub struct ChatServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    registry: Arc<ClientRegistry>,
    broadcaster: Broadcaster,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl ChatServer {
    /// Bind the listening socket described by `config`
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ChatError::bind(addr.clone(), e))?;
        let local_addr = listener.local_addr()?;

        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            listener,
            local_addr,
            config,
            registry,
            broadcaster,
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Accept clients until shutdown is requested or the listener fails
    ///
    /// On the way out every client is closed and their workers are given
    /// `shutdown_grace` to finish.
    pub async fn run(self) -> Result<()> {
        let Self {
            listener,
            local_addr,
            config,
            registry,
            broadcaster,
            shutdown_tx,
        } = self;

        let settings = ConnectionSettings::from(&config);
        let options = WorkerOptions::from(&config);
        let mut shutdown_rx = shutdown_tx.subscribe();
        let mut workers: JoinSet<DisconnectReason> = JoinSet::new();
        let mut state = ListenerState::Listening;
        let mut outcome = Ok(());

        tracing::info!(
            "Chat server listening on {} (protocol: {})",
            local_addr,
            config.protocol
        );

        while state == ListenerState::Listening {
            tokio::select! {
                // Keep the watch guard inside this future; it must not live across an await
                _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => {
                    tracing::info!("Shutdown requested");
                    state = ListenerState::ShuttingDown;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = accept_client(stream, peer, &config, &settings, &options, &broadcaster, &mut workers) {
                            tracing::error!("Internal error, stopping server: {}", e);
                            outcome = Err(e);
                            state = ListenerState::ShuttingDown;
                        }
                    }
                    Err(e) if is_transient_accept_error(&e) => {
                        tracing::warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(e) => {
                        tracing::error!("Listener failed: {}", e);
                        outcome = Err(ChatError::Accept(e));
                        state = ListenerState::ShuttingDown;
                    }
                },

                // Reap finished workers so the set does not grow unbounded
                Some(finished) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!("Client worker panicked: {}", e);
                    }
                }
            }
        }

        drop(listener);
        shutdown_tx.send_replace(true);

        if config.announce {
            broadcaster.broadcast_all(&config.protocol.system("server shutting down"));
        }

        let clients = registry.drain();
        tracing::info!("Closing {} client connection(s)", clients.len());
        for (_, handle) in &clients {
            handle.close();
        }

        let grace = config.shutdown_grace();
        let drained = tokio::time::timeout(grace, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!("{} worker(s) still running after {:?}, aborting", workers.len(), grace);
            workers.shutdown().await;
        }

        tracing::info!("Chat server on {} stopped", local_addr);
        outcome
    }
}

/// Register an accepted stream and start its worker
///
/// Only an internal invariant violation is returned as an error; rejected
/// clients are not errors.
fn accept_client(
    stream: TcpStream,
    peer: SocketAddr,
    config: &ServerConfig,
    settings: &ConnectionSettings,
    options: &WorkerOptions,
    broadcaster: &Broadcaster,
    workers: &mut JoinSet<DisconnectReason>,
) -> Result<()> {
    let registry = broadcaster.registry();
    let id = registry.next_id();
    let Connection {
        handle,
        reader,
        writer,
    } = Connection::from_tcp(stream, id, peer, settings);

    if config.max_clients > 0 && registry.len() >= config.max_clients {
        tracing::warn!("Rejecting {} from {}: server full ({} clients)", id, peer, config.max_clients);
        let _ = handle.send_line(&config.protocol.system("server full"));
        handle.close();
        return Ok(());
    }

    if let Err(e) = registry.add(Arc::clone(&handle)) {
        // Ids come from a monotonic counter, so this is a bug
        handle.close();
        return Err(e);
    }

    tracing::info!("Accepted {} from {} ({} connected)", id, peer, registry.len());

    if config.announce && config.protocol == ChatProtocol::Plain {
        let notice = config.protocol.join_notice(&handle.display_name());
        broadcaster.announce(id, &notice);
    }

    let worker = ReceiveWorker::new(handle, reader, Some(writer), broadcaster.clone(), options.clone());
    workers.spawn(worker.run());
    Ok(())
}

/// Accept errors caused by a single bad connection or temporary resource
/// pressure; the listener itself is still usable.
fn is_transient_accept_error(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) {
        return true;
    }

    is_resource_exhaustion(e)
}

/// ENFILE / EMFILE / ENOBUFS / ENOMEM (Linux errno values)
#[cfg(target_os = "linux")]
fn is_resource_exhaustion(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(23) | Some(24) | Some(105) | Some(12))
}

#[cfg(not(target_os = "linux"))]
fn is_resource_exhaustion(_e: &io::Error) -> bool {
    false
}
