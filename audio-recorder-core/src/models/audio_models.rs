use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the channels of a buffer are laid out in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleLayout {
    /// One slice, frames of `channels` consecutive samples (L R L R ...).
    Interleaved,
    /// One slice per channel.
    NonInterleaved,
}

/// Format of the buffers the audio source delivers to the render callback.
///
/// A `sample_rate` of 0 means "not known yet"; the recorder fills it in
/// from the audio source's live rate before opening a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputStreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub layout: SampleLayout,
}

impl InputStreamFormat {
    pub fn interleaved(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            layout: SampleLayout::Interleaved,
        }
    }

    pub fn non_interleaved(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            layout: SampleLayout::NonInterleaved,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0
    }

    /// Wall-clock length of a buffer holding `frames` frames.
    pub fn buffer_period(&self, frames: u32) -> Option<Duration> {
        if self.sample_rate == 0 || frames == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(frames as f64 / self.sample_rate as f64))
    }
}

/// Sample encoding written to the output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleEncoding {
    /// Signed little-endian integer PCM.
    PcmInt,
    /// IEEE 754 float.
    Float,
}

/// Negotiated format of the file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputFileFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub encoding: SampleEncoding,
}

impl OutputFileFormat {
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth: 16,
            encoding: SampleEncoding::PcmInt,
        }
    }

    pub fn float32(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth: 32,
            encoding: SampleEncoding::Float,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.channels == 0 {
            return Err("channel count must be positive".into());
        }
        let supported = match self.encoding {
            SampleEncoding::PcmInt => [16, 24, 32].contains(&self.bit_depth),
            SampleEncoding::Float => self.bit_depth == 32,
        };
        if !supported {
            return Err(format!(
                "unsupported bit depth {} for {:?} encoding",
                self.bit_depth, self.encoding
            ));
        }
        Ok(())
    }

    /// Check that buffers in `input` can be written without conversion.
    ///
    /// The recorder writes what it is given: no resampling, no channel mapping.
    pub fn check_compatible(&self, input: &InputStreamFormat) -> Result<(), String> {
        self.validate()?;
        if self.sample_rate != input.sample_rate {
            return Err(format!(
                "output sample rate {} Hz differs from input {} Hz; sample-rate conversion is not supported",
                self.sample_rate, input.sample_rate
            ));
        }
        if self.channels != input.channels {
            return Err(format!(
                "output has {} channel(s) but input delivers {}",
                self.channels, input.channels
            ));
        }
        Ok(())
    }

    pub fn bytes_per_sample(&self) -> u16 {
        self.bit_depth / 8
    }

    pub fn bytes_per_frame(&self) -> u32 {
        self.bytes_per_sample() as u32 * self.channels as u32
    }
}

/// Destination of a recording: where, and in which format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub path: PathBuf,
    pub format: OutputFileFormat,
}

impl OutputTarget {
    pub fn new(path: impl Into<PathBuf>, format: OutputFileFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One buffer of f32 samples as handed to the render callback.
#[derive(Debug, Clone, Copy)]
pub enum AudioBuffer<'a> {
    Interleaved { samples: &'a [f32], channels: u16 },
    NonInterleaved { channels: &'a [&'a [f32]] },
}

impl<'a> AudioBuffer<'a> {
    pub fn interleaved(samples: &'a [f32], channels: u16) -> Self {
        Self::Interleaved { samples, channels }
    }

    pub fn non_interleaved(channels: &'a [&'a [f32]]) -> Self {
        Self::NonInterleaved { channels }
    }

    pub fn channels(&self) -> u16 {
        match self {
            Self::Interleaved { channels, .. } => *channels,
            Self::NonInterleaved { channels } => channels.len() as u16,
        }
    }

    /// Number of whole frames. A trailing partial frame is ignored.
    pub fn frames(&self) -> usize {
        match self {
            Self::Interleaved { samples, channels } => {
                if *channels == 0 {
                    0
                } else {
                    samples.len() / *channels as usize
                }
            }
            Self::NonInterleaved { channels } => {
                channels.iter().map(|c| c.len()).min().unwrap_or(0)
            }
        }
    }

    pub fn layout(&self) -> SampleLayout {
        match self {
            Self::Interleaved { .. } => SampleLayout::Interleaved,
            Self::NonInterleaved { .. } => SampleLayout::NonInterleaved,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Whether this buffer's shape matches a stream format.
    pub fn matches(&self, format: &InputStreamFormat) -> bool {
        self.layout() == format.layout && self.channels() == format.channels
    }

    /// Sample at `frame` for `channel`. Panics when out of range.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        match self {
            Self::Interleaved { samples, channels } => {
                samples[frame * *channels as usize + channel]
            }
            Self::NonInterleaved { channels } => channels[channel][frame],
        }
    }
}

/// Counters maintained by the render callback, read on the control thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderDiagnostics {
    pub callback_count: u64,
    pub buffers_written: u64,
    pub frames_written: u64,
    pub failed_writes: u64,
    pub format_mismatches: u64,
    pub last_buffer_frames: u32,
}
