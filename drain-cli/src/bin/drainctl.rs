//! drainctl: send `rotate` / `quit` / `ping` to a running drain daemon over
//! its control socket.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use drain_daemon::{request_ping, request_quit, request_rotate, DaemonError};

#[derive(Parser, Debug)]
#[command(
    name = "drainctl",
    version,
    about = "Control a running drain daemon",
    long_about = None,
)]
struct Cli {
    /// Control socket the daemon was started with (`--control-socket`).
    #[arg(long, short)]
    socket: PathBuf,

    #[command(subcommand)]
    command: ControlCommand,
}

#[derive(Subcommand, Debug)]
enum ControlCommand {
    /// Queue a close-and-reopen of the output file.
    Rotate,
    /// Queue a shutdown; records queued after it are dropped.
    Quit,
    /// Check that the daemon is answering.
    Ping,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let outcome = match cli.command {
        ControlCommand::Rotate => request_rotate(&cli.socket),
        ControlCommand::Quit => request_quit(&cli.socket),
        ControlCommand::Ping => request_ping(&cli.socket),
    };

    match outcome {
        Ok(data) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&data).context("failed to render response JSON")?
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(DaemonError::DaemonNotRunning { .. }) => {
            eprintln!("daemon is not running");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err).context("control request failed"),
    }
}
