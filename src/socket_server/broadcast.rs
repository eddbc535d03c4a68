//! Message fan-out to connected clients.

use std::sync::Arc;

use crate::error::ChatError;
use crate::socket_server::connection::ConnectionHandle;
use crate::socket_server::registry::{ClientId, ClientRegistry};

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients the line was queued for
    pub delivered: usize,
    /// Recipients that failed and were dropped
    pub failed: usize,
}

/// Delivers lines to every registered client but the sender
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ClientRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Send `line` to every client except `sender`
    pub fn broadcast(&self, sender: ClientId, line: &str) -> BroadcastReport {
        let recipients = self.registry.snapshot_excluding(sender);
        self.deliver(recipients, line)
    }

    /// Send a server notice about `subject` to everyone else
    pub fn announce(&self, subject: ClientId, notice: &str) -> BroadcastReport {
        tracing::info!("{}", notice);
        self.broadcast(subject, notice)
    }

    /// Send `line` to every client
    pub fn broadcast_all(&self, line: &str) -> BroadcastReport {
        let recipients = self.registry.snapshot();
        self.deliver(recipients, line)
    }

    fn deliver(&self, recipients: Vec<(ClientId, Arc<ConnectionHandle>)>, line: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for (id, handle) in recipients {
            match handle.send_line(line) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    // Treat as a disconnect: prune now, the owning worker
                    // sees the closed handle and finishes its own cleanup
                    if is_departure(&e) {
                        tracing::debug!("Skipping {}: already closed", id);
                    } else {
                        tracing::warn!("Dropping {} after failed send: {}", id, e);
                    }
                    self.registry.remove(id);
                    handle.close();
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(
            "Broadcast to {} recipients ({} failed)",
            report.delivered,
            report.failed
        );
        report
    }
}

/// A recipient that was already closed left on its own (snapshot raced its
/// cleanup); anything else is a real delivery failure
fn is_departure(e: &ChatError) -> bool {
    matches!(e, ChatError::Closed)
}
