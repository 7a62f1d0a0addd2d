use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the recorder to the control thread.
///
/// The render callback never produces these directly; its failures are
/// counted and reported by the next `stop()`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    /// Missing output target, unresolvable stream format, or an invalid
    /// combination of input and output formats.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    FileIo(#[from] FileIoError),

    /// The render callback did not confirm the stop request in time.
    #[error("render callback did not confirm stop within {0:?}")]
    Timeout(Duration),
}

/// Failures reported by the file-writer collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FileIoError {
    #[error("could not open {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("write failed: {0}")]
    Write(String),

    /// I/O failure while appending samples. Carries only the kind so the
    /// audio thread can build it without allocating.
    #[error("write failed: {0}")]
    Io(io::ErrorKind),

    #[error("buffer has {buffer} channel(s), file expects {file}")]
    ChannelMismatch { buffer: u16, file: u16 },

    #[error("recording exceeds the container's data size limit")]
    SizeLimit,

    /// The writer refuses buffers after an earlier I/O failure.
    #[error("writer stopped after an earlier write failure")]
    WriterFailed,

    #[error("could not finalize {path}: {reason}")]
    Finalize { path: String, reason: String },

    /// The metadata sidecar could not be serialized or written.
    #[error("could not write metadata {path}: {reason}")]
    Metadata { path: String, reason: String },

    /// One or more buffers could not be written from the render callback.
    #[error("{failed_buffers} buffer(s) failed to write during recording")]
    CallbackWriteFailed { failed_buffers: u64 },
}

impl RecorderError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
