//! Daemon configuration and its defaults.

use std::path::PathBuf;

use tokio::sync::Semaphore;

use crate::error::DaemonError;

pub const DEFAULT_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Events that may wait between the sources and the serializer before
/// producers start blocking.
pub const DEFAULT_QUEUE_CAPACITY: usize = 3;

/// Largest request body accepted as one record (16 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Path every ingestion request must target.
pub const INGEST_PATH: &str = "/";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// File every open and reopen targets. Fixed for the process lifetime.
    pub output_path: PathBuf,
    pub address: String,
    pub port: u16,
    pub queue_capacity: usize,
    pub max_body_bytes: usize,
    /// Optional Unix socket accepting `rotate` / `quit` commands.
    pub control_socket: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            control_socket: None,
            log_format: LogFormat::default(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn validate(&self) -> Result<(), DaemonError> {
        if self.queue_capacity == 0 {
            return Err(DaemonError::Config(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity > Semaphore::MAX_PERMITS {
            return Err(DaemonError::Config(format!(
                "queue capacity must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.max_body_bytes == 0 {
            return Err(DaemonError::Config(
                "max body size must be at least 1 byte".to_string(),
            ));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(DaemonError::Config("output path is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DaemonConfig::new("/tmp/log.out");
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.queue_capacity, 3);
        assert_eq!(config.max_body_bytes, 16 * 1024 * 1024);
        assert!(config.control_socket.is_none());
        assert_eq!(config.log_format, LogFormat::Text);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let mut config = DaemonConfig::new("/tmp/log.out");
        config.queue_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue capacity"), "got: {err}");
    }

    #[test]
    fn queue_capacity_beyond_channel_limit_is_rejected() {
        let mut config = DaemonConfig::new("/tmp/log.out");
        config.queue_capacity = usize::MAX;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)), "got: {err}");
        assert!(err.to_string().contains("at most"), "got: {err}");

        config.queue_capacity = Semaphore::MAX_PERMITS;
        config.validate().expect("largest channel capacity is accepted");
    }

    #[test]
    fn empty_output_path_is_rejected() {
        let config = DaemonConfig::new("");
        assert!(matches!(config.validate(), Err(DaemonError::Config(_))));
    }
}
