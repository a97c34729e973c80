//! drain daemon: HTTP ingestion + signal-driven rotation funnelled through a
//! single serializer that owns the output file.

pub mod config;
pub mod control;
mod error;
pub mod ingest;
mod runtime;
pub mod serializer;
pub mod signals;

pub use config::{DaemonConfig, LogFormat};
pub use control::{
    request_ping, request_quit, request_rotate, send_request, ControlRequest, ControlResponse,
};
pub use error::DaemonError;
pub use runtime::{init_tracing, run, start_blocking, Daemon};
pub use serializer::{Exit, Serializer};
