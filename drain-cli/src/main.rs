//! drain: append HTTP request bodies to a log file, reopening it on SIGHUP.
//!
//! # Usage
//!
//! ```text
//! drain <OUTPUT_PATH> [--address 0.0.0.0] [--port 8080] [--queue-capacity 3]
//!       [--max-body-bytes 16777216] [--control-socket <PATH>] [--log-format text|json]
//! ```
//!
//! Rotation: rename the file away, then `kill -HUP <pid>` (or
//! `drainctl --socket <PATH> rotate`). SIGINT/SIGTERM stop the daemon.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;

use drain_daemon::config::{
    DEFAULT_ADDRESS, DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY,
};
use drain_daemon::{start_blocking, DaemonConfig, Exit, LogFormat};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "drain",
    version,
    about = "Append HTTP request bodies to a log file, reopening it on SIGHUP",
    long_about = None,
)]
struct Cli {
    /// File every record is appended to (created if missing, never truncated).
    output_path: PathBuf,

    /// Address the HTTP listener binds to.
    #[arg(long, default_value = DEFAULT_ADDRESS)]
    address: String,

    /// Port the HTTP listener binds to.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Events that may be queued before request handlers start waiting.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Largest request body accepted as one record.
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    /// Unix socket accepting `rotate` and `quit` commands.
    #[arg(long)]
    control_socket: Option<PathBuf>,

    /// Log output format on stderr.
    #[arg(long, default_value_t = LogFormatArg::default())]
    log_format: LogFormatArg,
}

impl Cli {
    fn into_config(self) -> DaemonConfig {
        let mut config = DaemonConfig::new(self.output_path);
        config.address = self.address;
        config.port = self.port;
        config.queue_capacity = self.queue_capacity;
        config.max_body_bytes = self.max_body_bytes;
        config.control_socket = self.control_socket;
        config.log_format = self.log_format.into();
        config
    }
}

// ---------------------------------------------------------------------------
// LogFormat argument, parsed from CLI strings
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse [`LogFormat`] from CLI args.
#[derive(Debug, Clone, Copy, Default)]
struct LogFormatArg(LogFormat);

impl FromStr for LogFormatArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self(LogFormat::Text)),
            "json" => Ok(Self(LogFormat::Json)),
            other => Err(format!("unknown log format '{other}'; expected: text, json")),
        }
    }
}

impl fmt::Display for LogFormatArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        arg.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let config = Cli::parse().into_config();
    let path = config.output_path.clone();

    let exit = start_blocking(config)
        .with_context(|| format!("drain for {} exited with error", path.display()))?;
    match exit {
        Exit::Quit | Exit::SourcesClosed => Ok(ExitCode::SUCCESS),
    }
}
