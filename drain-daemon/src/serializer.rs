//! The single control loop that applies events to the output file.
//!
//! Every source hands its events to one bounded queue; the [`Serializer`] is
//! the only consumer and the only owner of the [`FileSink`]. One event is
//! executed to completion before the next is taken, so queue order is the
//! order of side effects on disk and no two file operations ever overlap.

use drain_core::{Event, FileSink, SinkError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Why the serializer loop stopped without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// A `Quit` event was taken from the queue.
    Quit,
    /// Every sender was dropped; nothing can arrive any more.
    SourcesClosed,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    records: u64,
    write_failures: u64,
    rotations: u64,
}

pub struct Serializer {
    sink: FileSink,
    events: mpsc::Receiver<Event>,
    counters: Counters,
}

impl Serializer {
    pub fn new(sink: FileSink, events: mpsc::Receiver<Event>) -> Self {
        Self {
            sink,
            events,
            counters: Counters::default(),
        }
    }

    /// Run the loop on a dedicated blocking thread.
    pub fn spawn(self) -> JoinHandle<Result<Exit, SinkError>> {
        tokio::task::spawn_blocking(move || self.run())
    }

    /// Drain the queue until `Quit`, a fatal sink error, or queue closure.
    ///
    /// Blocks the calling thread while the queue is empty; must not be
    /// called from inside an async context.
    pub fn run(mut self) -> Result<Exit, SinkError> {
        tracing::info!(path = %self.sink.path().display(), "serializer started");

        let outcome = loop {
            let Some(event) = self.events.blocking_recv() else {
                break Ok(Exit::SourcesClosed);
            };
            match self.apply(event) {
                Ok(None) => continue,
                Ok(Some(exit)) => break Ok(exit),
                Err(err) => break Err(err),
            }
        };

        tracing::info!(
            records = self.counters.records,
            write_failures = self.counters.write_failures,
            rotations = self.counters.rotations,
            outcome = ?outcome.as_ref().map_err(|err| err.to_string()),
            "serializer stopped",
        );
        outcome
    }

    fn apply(&mut self, event: Event) -> Result<Option<Exit>, SinkError> {
        match event {
            Event::Write { payload } => {
                match self.sink.append(&payload) {
                    Ok(()) => self.counters.records += 1,
                    Err(err) => {
                        self.counters.write_failures += 1;
                        tracing::error!(error = %err, bytes = payload.len(), "record dropped");
                    }
                }
                Ok(None)
            }
            Event::Rotate => {
                if let Err(err) = self.sink.reopen() {
                    tracing::error!(error = %err, "rotation failed");
                    return Err(err);
                }
                self.counters.rotations += 1;
                tracing::info!(path = %self.sink.path().display(), "output file reopened");
                Ok(None)
            }
            Event::Quit => {
                tracing::info!(pending = self.events.len(), "quit requested");
                Ok(Some(Exit::Quit))
            }
        }
    }
}
