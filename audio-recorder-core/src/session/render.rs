use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::models::audio_models::AudioBuffer;
use crate::models::state::RecorderState;
use crate::session::shared::SharedState;

/// Real-time half of a [`FileRecorder`](crate::FileRecorder).
///
/// The audio engine calls [`render`](Self::render) once per buffer. It never
/// blocks, locks or allocates, and it never reports errors: failed writes
/// and malformed buffers are counted and surfaced by the next `stop()`.
///
/// Only one callback exists per recorder at a time; `render` takes
/// `&mut self` so a single audio thread drives it.
pub struct RenderCallback {
    shared: Arc<SharedState>,
}

impl RenderCallback {
    pub(crate) fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    /// Process one buffer from the audio engine.
    ///
    /// When the recorder is Recording and no stop is pending, the buffer is
    /// appended to the open file. The buffer on which a stop request is
    /// first observed is dropped, not written.
    pub fn render(&mut self, buffer: &AudioBuffer<'_>) {
        let frames = buffer.frames();
        if frames == 0 {
            return;
        }

        let shared = &*self.shared;
        shared.callback_count.fetch_add(1, Ordering::Relaxed);
        shared
            .last_buffer_frames
            .store(frames as u32, Ordering::Relaxed);

        if shared.state() != RecorderState::Recording {
            self.clear_confirmation();
            return;
        }

        // Raise the confirmation before looking at the stop request. Paired
        // with `stop()` storing the request before reading the confirmation,
        // either this invocation sees the request or `stop()` waits for us.
        shared.recording_confirmed.store(true, Ordering::SeqCst);
        if shared.stop_requested.load(Ordering::SeqCst) {
            self.clear_confirmation();
            return;
        }

        if !buffer.matches(&shared.session_format()) {
            shared.format_mismatches.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // SAFETY: confirmation raised and no stop requested, so the
        // controller will not install or take the writer until a later
        // invocation clears the confirmation.
        let writer = unsafe { shared.writer_mut() };
        match writer.map(|writer| writer.write(buffer)) {
            Some(Ok(())) => {
                shared.buffers_written.fetch_add(1, Ordering::Relaxed);
                shared
                    .frames_written
                    .fetch_add(frames as u64, Ordering::Relaxed);
            }
            Some(Err(_)) | None => {
                shared.failed_writes.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Recorder state as seen from the audio thread.
    pub fn recorder_state(&self) -> RecorderState {
        self.shared.state()
    }

    /// Whether this callback is currently confirming an active recording.
    pub fn is_recording_confirmed(&self) -> bool {
        self.shared.recording_confirmed.load(Ordering::SeqCst)
    }

    fn clear_confirmation(&self) {
        if self.shared.recording_confirmed.load(Ordering::Relaxed) {
            self.shared
                .recording_confirmed
                .store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for RenderCallback {
    fn drop(&mut self) {
        self.clear_confirmation();
        self.shared.callback_claimed.store(false, Ordering::SeqCst);
    }
}
