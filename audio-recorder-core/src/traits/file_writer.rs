use std::path::PathBuf;

use crate::models::audio_models::{AudioBuffer, InputStreamFormat, OutputTarget};
use crate::models::error::FileIoError;

/// An open output file accepting sequential appends.
///
/// `write` runs on the real-time thread. Implementations should not
/// allocate there; they may block on disk I/O, which the recorder accepts.
pub trait AudioFileWriter: Send {
    /// Append one buffer.
    fn write(&mut self, buffer: &AudioBuffer<'_>) -> Result<(), FileIoError>;

    /// Flush, update container metadata and close, leaving the file
    /// immediately readable by other processes.
    fn finalize(self: Box<Self>) -> Result<FinalizedFile, FileIoError>;
}

/// Opens [`AudioFileWriter`]s for a target.
pub trait AudioFileWriterFactory: Send + Sync {
    fn open(
        &self,
        target: &OutputTarget,
        input: &InputStreamFormat,
    ) -> Result<Box<dyn AudioFileWriter>, FileIoError>;
}

/// Summary of a closed output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedFile {
    pub path: PathBuf,
    /// Bytes of sample data, excluding container headers.
    pub data_bytes: u64,
    /// SHA-256 hex digest of the whole file, when the writer computes one.
    pub checksum: Option<String>,
}
