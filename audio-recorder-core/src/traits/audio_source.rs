use crate::models::audio_models::InputStreamFormat;

/// The audio session that feeds the render callback.
///
/// Implementations own the real-time thread and call
/// [`RenderCallback::render`](crate::RenderCallback::render) once per buffer.
/// The recorder only asks them about the stream format.
///
/// Implemented by:
/// - `CpalInput` (audio-recorder-cpal)
/// - [`FixedFormatSource`] for hosts that already know their format
pub trait AudioSource: Send + Sync {
    /// Format of the buffers the source delivers, if it is known.
    fn stream_format(&self) -> Option<InputStreamFormat>;

    /// Live sample rate of the session. Used to complete a cached format
    /// whose rate was left unset.
    fn current_sample_rate(&self) -> Option<u32> {
        self.stream_format()
            .map(|format| format.sample_rate)
            .filter(|rate| *rate > 0)
    }
}

/// An [`AudioSource`] reporting a fixed, preconfigured format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedFormatSource {
    format: Option<InputStreamFormat>,
}

impl FixedFormatSource {
    pub fn new(format: InputStreamFormat) -> Self {
        Self {
            format: Some(format),
        }
    }

    /// A source that cannot report any format.
    pub fn unknown() -> Self {
        Self { format: None }
    }
}

impl AudioSource for FixedFormatSource {
    fn stream_format(&self) -> Option<InputStreamFormat> {
        self.format
    }
}
