//! Operator signals turned into events.
//!
//! SIGHUP asks for a rotation, SIGINT/SIGTERM ask the process to quit. Both
//! listeners only ever enqueue; they never touch the output file.
//!
//! `register` must run before anything else can provoke a signal: until a
//! handler is installed, SIGHUP still has its default disposition and
//! terminates the process.

use drain_core::Event;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;

use crate::error::DaemonError;

pub struct RotationSource {
    hangup: Signal,
}

impl RotationSource {
    pub fn register() -> Result<Self, DaemonError> {
        let hangup = signal(SignalKind::hangup()).map_err(|source| DaemonError::Signal {
            signal: "SIGHUP",
            source,
        })?;
        Ok(Self { hangup })
    }

    /// Enqueue one `Rotate` per observed SIGHUP, forever.
    ///
    /// Deliveries the kernel merges count as one. SIGHUPs that arrive while
    /// this listener waits on a full queue are also merged into a single
    /// pending rotation, which is then queued once.
    pub async fn run(mut self, events: mpsc::Sender<Event>) {
        while self.hangup.recv().await.is_some() {
            tracing::info!("received SIGHUP, queueing rotation");
            if events.send(Event::Rotate).await.is_err() {
                tracing::debug!("event queue closed, rotation listener exiting");
                return;
            }
        }
    }
}

pub struct QuitSource {
    interrupt: Signal,
    terminate: Signal,
}

impl QuitSource {
    pub fn register() -> Result<Self, DaemonError> {
        let interrupt = signal(SignalKind::interrupt()).map_err(|source| DaemonError::Signal {
            signal: "SIGINT",
            source,
        })?;
        let terminate = signal(SignalKind::terminate()).map_err(|source| DaemonError::Signal {
            signal: "SIGTERM",
            source,
        })?;
        Ok(Self {
            interrupt,
            terminate,
        })
    }

    /// Enqueue a single `Quit` on the first SIGINT or SIGTERM.
    pub async fn run(mut self, events: mpsc::Sender<Event>) {
        let name = tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        };
        tracing::info!(signal = name, "received termination signal, queueing quit");
        if events.send(Event::Quit).await.is_err() {
            tracing::debug!("event queue closed before quit could be queued");
        }
    }
}
