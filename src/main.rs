//! chat-relay CLI entry point

use std::process::ExitCode;

use clap::Parser;

use chat_relay::commands::{run_connect, run_serve};
use chat_relay::{ChatError, Cli, Commands};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<ChatError>()
                .map(ChatError::exit_code)
                .unwrap_or(ExitCode::FAILURE)
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve(args) => run_serve(&cli, args),
        Commands::Connect(args) => run_connect(&cli, args),
    }
}
