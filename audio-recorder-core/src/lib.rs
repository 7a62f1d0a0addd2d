//! # audio-recorder-core
//!
//! Lock-free audio-to-disk recorder.
//!
//! A [`FileRecorder`] owns the output file on a control thread; its
//! [`RenderCallback`] runs on the audio engine's real-time thread and appends
//! each buffer to the file. The two halves coordinate through a pair of
//! atomic flags, so the audio thread never blocks on a lock or waits for the
//! controller. Audio backends implement [`AudioSource`] and drive the
//! callback (see the `audio-recorder-cpal` crate).
//!
//! ## Architecture
//!
//! ```text
//! audio-recorder-core (this crate)
//! ├── traits/       ← AudioSource, AudioFileWriter(Factory), RecorderDelegate
//! ├── models/       ← RecorderError, RecorderState, RecorderConfig, formats, buffers
//! ├── processing/   ← WAV header generation, sample encoding
//! ├── session/      ← FileRecorder (controller), RenderCallback, RecorderHandle
//! └── storage/      ← WavFileWriter, metadata sidecar
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{
    AudioBuffer, InputStreamFormat, OutputFileFormat, OutputTarget, RecorderDiagnostics,
    SampleEncoding, SampleLayout,
};
pub use models::config::RecorderConfig;
pub use models::error::{FileIoError, RecorderError};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::RecorderState;
pub use session::handle::RecorderHandle;
pub use session::recorder::FileRecorder;
pub use session::render::RenderCallback;
pub use storage::wav_writer::{WavFileWriter, WavWriterFactory};
pub use traits::audio_source::{AudioSource, FixedFormatSource};
pub use traits::file_writer::{AudioFileWriter, AudioFileWriterFactory, FinalizedFile};
pub use traits::recorder_delegate::RecorderDelegate;
