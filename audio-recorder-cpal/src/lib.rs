//! # audio-recorder-cpal
//!
//! cpal input backend for audio-recorder.
//!
//! Provides:
//! - `CpalInput` — an `AudioSource` over the default cpal input device whose
//!   stream drives a recorder's `RenderCallback`
//!
//! ## Usage
//! ```ignore
//! use audio_recorder_core::{AudioSource, FileRecorder, OutputFileFormat, OutputTarget};
//! use audio_recorder_cpal::CpalInput;
//!
//! let input = CpalInput::default_device()?;
//! let format = input.stream_format().unwrap();
//! let mut recorder = FileRecorder::new(input);
//! let _stream = recorder.source().start(recorder.render_callback()?)?;
//!
//! recorder.queue(OutputTarget::new(
//!     "take1.wav",
//!     OutputFileFormat::pcm16(format.sample_rate, format.channels),
//! ))?;
//! recorder.record()?;
//! // ...
//! let result = recorder.stop()?;
//! ```

pub mod cpal_input;

pub use cpal_input::CpalInput;
