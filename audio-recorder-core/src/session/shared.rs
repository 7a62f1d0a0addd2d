use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::models::audio_models::{InputStreamFormat, RecorderDiagnostics, SampleLayout};
use crate::models::state::RecorderState;
use crate::traits::file_writer::AudioFileWriter;

/// State shared between the controller and the render callback.
///
/// Every field the callback reads is an atomic with a single writer:
///
/// | field                 | written by | read by    |
/// |-----------------------|------------|------------|
/// | `state`               | controller | callback   |
/// | `stop_requested`      | controller | callback   |
/// | `recording_confirmed` | callback   | controller |
/// | session format        | controller | callback   |
/// | counters              | callback   | controller |
///
/// The writer slot is handed back and forth by the flag protocol rather
/// than guarded by a lock.
pub(crate) struct SharedState {
    state: AtomicU8,
    pub(crate) stop_requested: AtomicBool,
    pub(crate) recording_confirmed: AtomicBool,
    pub(crate) callback_claimed: AtomicBool,

    session_sample_rate: AtomicU32,
    session_channels: AtomicU16,
    session_interleaved: AtomicBool,

    pub(crate) callback_count: AtomicU64,
    pub(crate) buffers_written: AtomicU64,
    pub(crate) frames_written: AtomicU64,
    pub(crate) failed_writes: AtomicU64,
    pub(crate) format_mismatches: AtomicU64,
    pub(crate) last_buffer_frames: AtomicU32,

    writer: UnsafeCell<Option<Box<dyn AudioFileWriter>>>,
}

// SAFETY: `writer` is the only non-Sync field. The controller touches it
// only while the state is not Recording and the callback has confirmed it
// stopped (see `FileRecorder::stop`); the callback touches it only between
// raising `recording_confirmed` and observing `stop_requested == false`.
// Those windows never overlap, so at most one thread accesses the slot.
unsafe impl Sync for SharedState {}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(RecorderState::Idle.as_u8()),
            stop_requested: AtomicBool::new(false),
            recording_confirmed: AtomicBool::new(false),
            callback_claimed: AtomicBool::new(false),
            session_sample_rate: AtomicU32::new(0),
            session_channels: AtomicU16::new(0),
            session_interleaved: AtomicBool::new(true),
            callback_count: AtomicU64::new(0),
            buffers_written: AtomicU64::new(0),
            frames_written: AtomicU64::new(0),
            failed_writes: AtomicU64::new(0),
            format_mismatches: AtomicU64::new(0),
            last_buffer_frames: AtomicU32::new(0),
            writer: UnsafeCell::new(None),
        }
    }

    pub(crate) fn state(&self) -> RecorderState {
        RecorderState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Publish a new state. Everything written before this call (writer
    /// slot, session format) is visible to a callback that observes it.
    pub(crate) fn publish_state(&self, state: RecorderState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn session_format(&self) -> InputStreamFormat {
        InputStreamFormat {
            sample_rate: self.session_sample_rate.load(Ordering::Relaxed),
            channels: self.session_channels.load(Ordering::Relaxed),
            layout: if self.session_interleaved.load(Ordering::Relaxed) {
                SampleLayout::Interleaved
            } else {
                SampleLayout::NonInterleaved
            },
        }
    }

    /// Record the format of a new session and zero the per-session counters.
    /// Called by the controller while Idle.
    pub(crate) fn begin_session(&self, format: &InputStreamFormat) {
        self.session_sample_rate
            .store(format.sample_rate, Ordering::Relaxed);
        self.session_channels.store(format.channels, Ordering::Relaxed);
        self.session_interleaved.store(
            format.layout == SampleLayout::Interleaved,
            Ordering::Relaxed,
        );
        self.buffers_written.store(0, Ordering::Relaxed);
        self.frames_written.store(0, Ordering::Relaxed);
        self.failed_writes.store(0, Ordering::Relaxed);
        self.format_mismatches.store(0, Ordering::Relaxed);
    }

    pub(crate) fn diagnostics(&self) -> RecorderDiagnostics {
        RecorderDiagnostics {
            callback_count: self.callback_count.load(Ordering::Relaxed),
            buffers_written: self.buffers_written.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
            format_mismatches: self.format_mismatches.load(Ordering::Relaxed),
            last_buffer_frames: self.last_buffer_frames.load(Ordering::Relaxed),
        }
    }

    /// # Safety
    ///
    /// Controller only, while the callback cannot be inside the writer
    /// window: state is not Recording and no stop confirmation is pending.
    pub(crate) unsafe fn install_writer(&self, writer: Box<dyn AudioFileWriter>) {
        *self.writer.get() = Some(writer);
    }

    /// # Safety
    ///
    /// Same contract as [`SharedState::install_writer`].
    pub(crate) unsafe fn take_writer(&self) -> Option<Box<dyn AudioFileWriter>> {
        (*self.writer.get()).take()
    }

    /// # Safety
    ///
    /// Render callback only, after raising `recording_confirmed` and then
    /// observing `stop_requested == false`. The returned reference must not
    /// outlive the current invocation.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn writer_mut(&self) -> Option<&mut (dyn AudioFileWriter + 'static)> {
        (*self.writer.get()).as_deref_mut()
    }
}
