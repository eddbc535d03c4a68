//! Console client command handler
//!
//! Reads lines from stdin and sends them to the server while printing
//! everything the server relays. When the connection drops the client
//! reconnects with exponential back-off unless `--no-reconnect` is given.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::cli::{Cli, ConnectArgs};
use crate::client::{default_name, Backoff, ChatSession, Renderer};
use crate::commands::{init_tracing, load_config, runtime};
use crate::config::ClientConfig;

/// Typed to leave the chat
const QUIT_COMMAND: &str = "/quit";

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// stdin closed, `/quit` or Ctrl-C
    UserQuit,
    /// The server hung up or the socket failed
    Disconnected,
}

/// Run the interactive client
pub fn run_connect(cli: &Cli, args: &ConnectArgs) -> anyhow::Result<()> {
    let mut config = load_config(cli)?;
    init_tracing(&cli.log_level(&config));
    args.apply(&mut config.client);
    config.client.validate()?;

    let name = config.client.name.clone().unwrap_or_else(default_name);
    let renderer = Renderer::new(!args.no_timestamps);

    runtime()?.block_on(chat_loop(config.client, name, renderer))
}

async fn chat_loop(config: ClientConfig, name: String, renderer: Renderer) -> anyhow::Result<()> {
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut backoff = Backoff::from_config(&config);

    loop {
        match ChatSession::open(&config, &name).await {
            Ok(session) => {
                backoff.reset();
                println!(
                    "{}",
                    renderer.status(&format!(
                        "Connected to {} as {}",
                        config.server_addr(),
                        session.name()
                    ))
                );

                if run_session(session, &mut input, &renderer).await? == SessionEnd::UserQuit {
                    return Ok(());
                }
                println!("{}", renderer.status("Disconnected from server"));
            }
            Err(e) if config.reconnect => {
                println!("{}", renderer.status(&e.to_string()));
            }
            Err(e) => return Err(e).context("connecting to chat server"),
        }

        if !config.reconnect {
            return Ok(());
        }

        let delay = backoff.next_delay();
        println!(
            "{}",
            renderer.status(&format!("Reconnecting in {}s...", delay.as_secs()))
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn run_session(
    mut session: ChatSession,
    input: &mut Lines<BufReader<Stdin>>,
    renderer: &Renderer,
) -> anyhow::Result<SessionEnd> {
    loop {
        tokio::select! {
            incoming = session.next_line() => match incoming {
                Ok(Some(line)) => println!("{}", renderer.render(&line)),
                Ok(None) => return Ok(SessionEnd::Disconnected),
                Err(e) => {
                    tracing::debug!("Read from server failed: {}", e);
                    return Ok(SessionEnd::Disconnected);
                }
            },

            typed = input.next_line() => {
                let Some(text) = typed.context("reading stdin")? else {
                    return Ok(SessionEnd::UserQuit);
                };
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if text == QUIT_COMMAND {
                    return Ok(SessionEnd::UserQuit);
                }
                if let Err(e) = session.send(text).await {
                    tracing::debug!("Send to server failed: {}", e);
                    return Ok(SessionEnd::Disconnected);
                }
            }

            _ = tokio::signal::ctrl_c() => return Ok(SessionEnd::UserQuit),
        }
    }
}
