use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::audio_models::{AudioBuffer, InputStreamFormat, OutputFileFormat, OutputTarget};
use crate::models::error::FileIoError;
use crate::processing::wav_format::{self, MAX_SAMPLE_BYTES};
use crate::traits::file_writer::{AudioFileWriter, AudioFileWriterFactory, FinalizedFile};

/// Streaming WAV file writer.
///
/// ## File Format
///
/// ```text
/// [44- or 68-byte WAV header, sizes zero until finalize]
/// [little-endian sample data, interleaved...]
/// [pad byte if the data length is odd]
/// ```
///
/// Each buffer is encoded into a scratch area allocated at open time and
/// handed to the `BufWriter` in whole frames, so `write` does not touch the
/// heap. After an I/O error the writer refuses further buffers; `finalize`
/// trims any partial frame so the header always matches the payload.
pub struct WavFileWriter {
    file_path: PathBuf,
    format: OutputFileFormat,
    header_len: u64,
    file: BufWriter<File>,
    scratch: Vec<u8>,
    data_bytes: u64,
    failure: Option<io::ErrorKind>,
}

impl WavFileWriter {
    /// Create the file and write a placeholder header.
    pub fn create(
        file_path: PathBuf,
        format: OutputFileFormat,
        buffer_bytes: usize,
    ) -> Result<Self, FileIoError> {
        format.validate().map_err(|reason| open_error(&file_path, reason))?;

        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                open_error(&file_path, format!("failed to create directory: {}", e))
            })?;
        }

        let file = File::create(&file_path).map_err(|e| open_error(&file_path, e.to_string()))?;
        let mut file = BufWriter::with_capacity(buffer_bytes, file);

        // Data size placeholder, rewritten on finalize.
        let header = wav_format::generate_wav_header(&format, 0);
        file.write_all(&header)
            .map_err(|e| open_error(&file_path, format!("failed to write header: {}", e)))?;

        let frame_bytes = format.bytes_per_frame() as usize;
        let scratch_frames = (buffer_bytes / frame_bytes).max(1);

        Ok(Self {
            file_path,
            format,
            header_len: header.len() as u64,
            file,
            scratch: Vec::with_capacity(scratch_frames * frame_bytes),
            data_bytes: 0,
            failure: None,
        })
    }

    /// Bytes of sample data accepted so far.
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// The I/O error that stopped this writer, if any.
    pub fn failure(&self) -> Option<io::ErrorKind> {
        self.failure
    }
}

impl AudioFileWriter for WavFileWriter {
    fn write(&mut self, buffer: &AudioBuffer<'_>) -> Result<(), FileIoError> {
        if self.failure.is_some() {
            return Err(FileIoError::WriterFailed);
        }

        let channels = buffer.channels();
        if channels != self.format.channels {
            return Err(FileIoError::ChannelMismatch {
                buffer: channels,
                file: self.format.channels,
            });
        }

        let frames = buffer.frames();
        let frame_bytes = self.format.bytes_per_frame() as usize;
        if self.data_bytes + (frames * frame_bytes) as u64 > wav_format::MAX_DATA_SIZE {
            return Err(FileIoError::SizeLimit);
        }

        let chunk_frames = (self.scratch.capacity() / frame_bytes).max(1);
        let mut encoded = [0u8; MAX_SAMPLE_BYTES];
        let mut start = 0;
        while start < frames {
            let end = (start + chunk_frames).min(frames);
            self.scratch.clear();
            for frame in start..end {
                for channel in 0..channels as usize {
                    let len = wav_format::encode_sample(
                        buffer.sample(frame, channel),
                        &self.format,
                        &mut encoded,
                    );
                    self.scratch.extend_from_slice(&encoded[..len]);
                }
            }

            if let Err(e) = self.file.write_all(&self.scratch) {
                let kind = e.kind();
                self.failure = Some(kind);
                return Err(FileIoError::Io(kind));
            }
            self.data_bytes += self.scratch.len() as u64;
            start = end;
        }

        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<FinalizedFile, FileIoError> {
        let WavFileWriter {
            file_path,
            format,
            header_len,
            file: mut buffered,
            failure,
            ..
        } = *self;
        let finalize_error = |reason: String| FileIoError::Finalize {
            path: file_path.display().to_string(),
            reason,
        };

        // Bytes a failed flush could not write are discarded, not retried
        // after the header rewrite.
        let flushed = buffered.flush();
        let (mut file, _) = buffered.into_parts();

        let len = file
            .seek(SeekFrom::End(0))
            .map_err(|e| finalize_error(format!("failed to read file length: {}", e)))?;
        let payload = len.saturating_sub(header_len);
        let frame_bytes = format.bytes_per_frame() as u64;
        let data_bytes = payload - payload % frame_bytes;
        if data_bytes != payload {
            log::warn!(
                "Trimming {} byte(s) of a partial frame from {}",
                payload - data_bytes,
                file_path.display()
            );
        }
        if let Some(kind) = failure {
            log::warn!(
                "{} stopped early after a write error ({}); keeping {} data bytes",
                file_path.display(),
                kind,
                data_bytes
            );
        }

        // Bounded by MAX_DATA_SIZE in `write`.
        let data_size = u32::try_from(data_bytes)
            .map_err(|_| finalize_error("data chunk exceeds 4 GiB".into()))?;
        let pad = wav_format::pad_size(data_size) as u64;
        let header = wav_format::generate_wav_header(&format, data_size);

        file.set_len(header_len + data_bytes + pad)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| file.write_all(&header))
            .and_then(|_| file.sync_all())
            .map_err(|e| finalize_error(format!("failed to patch header: {}", e)))?;

        if let Err(e) = flushed {
            return Err(finalize_error(format!("flush failed: {}", e)));
        }

        let checksum = sha256_file(&file_path)
            .map_err(|e| finalize_error(format!("failed to read file for checksum: {}", e)))?;

        log::debug!(
            "Finalized {} ({} data bytes)",
            file_path.display(),
            data_bytes
        );

        Ok(FinalizedFile {
            path: file_path,
            data_bytes,
            checksum: Some(checksum),
        })
    }
}

/// Opens a [`WavFileWriter`] per target.
#[derive(Debug, Clone)]
pub struct WavWriterFactory {
    buffer_bytes: usize,
}

impl WavWriterFactory {
    pub fn new(buffer_bytes: usize) -> Self {
        Self { buffer_bytes }
    }
}

impl Default for WavWriterFactory {
    fn default() -> Self {
        Self::new(64 * 1024)
    }
}

impl AudioFileWriterFactory for WavWriterFactory {
    fn open(
        &self,
        target: &OutputTarget,
        input: &InputStreamFormat,
    ) -> Result<Box<dyn AudioFileWriter>, FileIoError> {
        target
            .format
            .check_compatible(input)
            .map_err(|reason| open_error(&target.path, reason))?;
        let writer = WavFileWriter::create(target.path.clone(), target.format, self.buffer_bytes)?;
        log::debug!("Opened {} for writing", target.path.display());
        Ok(Box::new(writer))
    }
}

fn open_error(path: &Path, reason: impl Into<String>) -> FileIoError {
    FileIoError::Open {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Compute the SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
