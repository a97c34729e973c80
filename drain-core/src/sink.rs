//! The append-only output file.
//!
//! A [`FileSink`] holds exactly one open handle to the output path. It has no
//! locking of its own: whoever owns it by value is the only writer.
//!
//! Rotation is close-then-open against the same path. An external tool is
//! expected to rename the file away first; the reopen then creates a fresh
//! file and the renamed one is never touched again.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::SinkError;

/// Separator written after every record.
pub const RECORD_SEPARATOR: &[u8] = b"\n";

#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Option<File>,
}

impl FileSink {
    /// Open `path` for appending, creating it if absent. Never truncates.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let file = open_append(&path)?;
        tracing::debug!(path = %path.display(), "opened output file");
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `payload` followed by a single newline.
    ///
    /// The payload and the separator are two sequential writes. If the
    /// payload write fails the separator is still attempted, so the next
    /// record starts on its own line; the first error is returned.
    pub fn append(&mut self, payload: &[u8]) -> Result<(), SinkError> {
        let file = self.file.as_mut().ok_or_else(|| SinkError::Closed {
            path: self.path.clone(),
        })?;

        let body = file.write_all(payload);
        let separator = file.write_all(RECORD_SEPARATOR);

        body.and(separator).map_err(|source| SinkError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Flush and sync the handle, then drop it.
    pub fn close(mut self) -> Result<(), SinkError> {
        self.close_handle()
    }

    /// Close the current handle and open the output path again.
    ///
    /// Both failures are fatal to the caller. After a failed open the sink
    /// holds no handle and every [`append`](Self::append) returns
    /// [`SinkError::Closed`].
    pub fn reopen(&mut self) -> Result<(), SinkError> {
        self.close_handle()?;
        let file = open_append(&self.path)?;
        self.file = Some(file);
        tracing::debug!(path = %self.path.display(), "reopened output file");
        Ok(())
    }

    fn close_handle(&mut self) -> Result<(), SinkError> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        // `File`'s Drop swallows close(2) errors; sync_all is where deferred
        // write-back failures still come to the surface.
        file.flush()
            .and_then(|()| sync_if_regular(&file))
            .map_err(|source| SinkError::Close {
                path: self.path.clone(),
                source,
            })
    }
}

/// fsync(2) rejects character devices, pipes and FIFOs with EINVAL, and
/// those have nothing to write back anyway.
fn sync_if_regular(file: &File) -> io::Result<()> {
    if file.metadata()?.is_file() {
        file.sync_all()
    } else {
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File, SinkError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })
}
