//! Chat server command handler
//!
//! Binds the relay server and runs it until Ctrl-C (or SIGTERM on unix),
//! then closes every client and waits for their workers to finish.

use anyhow::Context;

use crate::cli::{Cli, ServeArgs};
use crate::commands::{init_tracing, load_config, runtime};
use crate::socket_server::{ChatServer, ShutdownHandle};

/// Run the chat server
///
/// This creates a tokio runtime and blocks until the server stops.
pub fn run_serve(cli: &Cli, args: &ServeArgs) -> anyhow::Result<()> {
    let mut config = load_config(cli)?;
    init_tracing(&cli.log_level(&config));
    args.apply(&mut config.server);

    runtime()?.block_on(async move {
        tracing::info!("Starting chat-relay server v{}", env!("CARGO_PKG_VERSION"));

        let server = ChatServer::bind(config.server)
            .await
            .context("starting chat server")?;
        let shutdown = server.shutdown_handle();
        tokio::spawn(shutdown_on_signal(shutdown));

        server.run().await.context("chat server stopped with an error")
    })
}

/// Trigger shutdown on the first termination signal
async fn shutdown_on_signal(shutdown: ShutdownHandle) {
    wait_for_signal().await;
    tracing::info!("Received termination signal");
    shutdown.shutdown();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
