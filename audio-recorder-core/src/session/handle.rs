use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{OutputTarget, RecorderDiagnostics};
use crate::models::error::RecorderError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::RecorderState;
use crate::session::recorder::FileRecorder;
use crate::storage::wav_writer::WavWriterFactory;
use crate::traits::audio_source::AudioSource;
use crate::traits::file_writer::AudioFileWriterFactory;

/// Cloneable handle for driving one recorder from several control threads
/// (UI, hotkeys, IPC).
///
/// Control calls are serialized by a mutex. The render callback never
/// touches it, so holding the lock across a blocking `stop()` only delays
/// other control calls.
pub struct RecorderHandle<S: AudioSource, F: AudioFileWriterFactory = WavWriterFactory> {
    inner: Arc<Mutex<FileRecorder<S, F>>>,
}

impl<S: AudioSource, F: AudioFileWriterFactory> Clone for RecorderHandle<S, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: AudioSource, F: AudioFileWriterFactory> RecorderHandle<S, F> {
    pub fn new(recorder: FileRecorder<S, F>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(recorder)),
        }
    }

    pub fn queue(&self, target: OutputTarget) -> Result<(), RecorderError> {
        self.inner.lock().queue(target)
    }

    pub fn record(&self) -> Result<(), RecorderError> {
        self.inner.lock().record()
    }

    pub fn stop(&self) -> Result<Option<RecordingResult>, RecorderError> {
        self.inner.lock().stop()
    }

    pub fn state(&self) -> RecorderState {
        self.inner.lock().state()
    }

    pub fn diagnostics(&self) -> RecorderDiagnostics {
        self.inner.lock().diagnostics()
    }

    /// Run `f` with exclusive access to the recorder.
    pub fn with_recorder<R>(&self, f: impl FnOnce(&mut FileRecorder<S, F>) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
