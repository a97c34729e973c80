use std::net::SocketAddr;
use std::time::Duration;

use drain_core::{Event, FileSink, SinkError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{DaemonConfig, LogFormat};
use crate::control::ControlServer;
use crate::error::{io_err, DaemonError};
use crate::ingest::IngestServer;
use crate::serializer::{Exit, Serializer};
use crate::signals::{QuitSource, RotationSource};

/// How long listeners get to wind down once the serializer has stopped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Start the daemon and block the current thread until it exits.
pub fn start_blocking(config: DaemonConfig) -> Result<Exit, DaemonError> {
    init_tracing(config.log_format);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    let result = runtime.block_on(run(config));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

/// Run the daemon until `Quit` or a fatal error.
pub async fn run(config: DaemonConfig) -> Result<Exit, DaemonError> {
    Daemon::start(config).await?.wait().await
}

/// A started daemon: output file open, serializer running, sources wired.
pub struct Daemon {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    serializer: JoinHandle<Result<Exit, SinkError>>,
    ingest: JoinHandle<Result<(), DaemonError>>,
    control: Option<JoinHandle<Result<(), DaemonError>>>,
    listeners: Vec<JoinHandle<()>>,
}

impl Daemon {
    /// Open the output file, then bind and start every source.
    ///
    /// The output file is opened before anything is bound, so a bad path
    /// fails startup without ever listening on the network.
    pub async fn start(config: DaemonConfig) -> Result<Self, DaemonError> {
        config.validate()?;

        let sink = FileSink::open(&config.output_path).map_err(|err| {
            tracing::error!(error = %err, "cannot open output file");
            err
        })?;
        tracing::info!(path = %config.output_path.display(), "output file open");

        let (events_tx, events_rx) = mpsc::channel::<Event>(config.queue_capacity);

        let rotation = RotationSource::register()?;
        let quit = QuitSource::register()?;
        let ingest = IngestServer::bind(&config, events_tx.clone()).await?;
        let local_addr = ingest.local_addr()?;
        let control = config
            .control_socket
            .as_deref()
            .map(ControlServer::bind)
            .transpose()?;

        let shutdown = CancellationToken::new();
        let serializer = Serializer::new(sink, events_rx).spawn();

        let ingest = tokio::spawn(ingest.serve(shutdown.clone()));
        let control = control
            .map(|server| tokio::spawn(server.serve(events_tx.clone(), shutdown.clone())));
        let listeners = vec![
            tokio::spawn(rotation.run(events_tx.clone())),
            tokio::spawn(quit.run(events_tx)),
        ];

        Ok(Self {
            local_addr,
            shutdown,
            serializer,
            ingest,
            control,
            listeners,
        })
    }

    /// Address the HTTP listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the serializer to stop, then tear the sources down.
    ///
    /// If the HTTP listener dies first the daemon has lost its only write
    /// source, which is reported as an error.
    pub async fn wait(mut self) -> Result<Exit, DaemonError> {
        let finished = tokio::select! {
            joined = &mut self.serializer => Finished::Serializer(joined),
            served = &mut self.ingest => Finished::Ingest(served),
        };

        self.shutdown.cancel();
        for listener in &self.listeners {
            listener.abort();
        }

        match finished {
            Finished::Serializer(joined) => {
                let ingest = self.ingest;
                let control = self.control;
                let wind_down = async move {
                    log_join("ingest", ingest.await);
                    if let Some(control) = control {
                        log_join("control", control.await);
                    }
                };
                if tokio::time::timeout(SHUTDOWN_GRACE, wind_down).await.is_err() {
                    tracing::warn!("listeners did not stop within the grace period");
                }

                let outcome = joined.map_err(|err| {
                    DaemonError::Protocol(format!("serializer task join failure: {err}"))
                })?;
                Ok(outcome?)
            }
            Finished::Ingest(served) => {
                handle_join("ingest", served)?;
                Err(DaemonError::Protocol(
                    "http ingestion stopped unexpectedly".to_string(),
                ))
            }
        }
    }
}

enum Finished {
    Serializer(Result<Result<Exit, SinkError>, tokio::task::JoinError>),
    Ingest(Result<Result<(), DaemonError>, tokio::task::JoinError>),
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn log_join(task: &str, result: Result<Result<(), DaemonError>, tokio::task::JoinError>) {
    if let Err(err) = handle_join(task, result) {
        tracing::warn!(task, error = %err, "task ended with error during shutdown");
    }
}

/// Install the global subscriber, writing to stderr.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
