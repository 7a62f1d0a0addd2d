//! cpal input stream driving a recorder's render callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig, SupportedBufferSize};

use audio_recorder_core::{AudioBuffer, AudioSource, InputStreamFormat, RecorderError, RenderCallback};

/// Minimum samples preallocated for format conversion.
const SCRATCH_SAMPLES: usize = 8192;

/// Upper bound on the conversion scratch area, for hosts that report an
/// unbounded buffer size range.
const MAX_SCRATCH_SAMPLES: usize = 1 << 20;

/// An [`AudioSource`] backed by the host's default input device.
///
/// Holds the device's default input configuration; the device itself is
/// looked up again in [`start`](Self::start), since cpal devices are not
/// `Sync` on every host.
pub struct CpalInput {
    device_name: String,
    config: StreamConfig,
    sample_format: SampleFormat,
    max_buffer_frames: Option<u32>,
    dropped_buffers: Arc<AtomicU64>,
}

impl CpalInput {
    pub fn default_device() -> Result<Self, RecorderError> {
        let device = default_input_device()?;
        let device_name = device.name().unwrap_or_else(|_| "<unknown>".into());

        let supported = device.default_input_config().map_err(|e| {
            RecorderError::Configuration(format!(
                "no default input config for '{}': {}",
                device_name, e
            ))
        })?;

        let sample_format = supported.sample_format();
        let max_buffer_frames = match supported.buffer_size() {
            SupportedBufferSize::Range { max, .. } => Some(*max),
            SupportedBufferSize::Unknown => None,
        };
        if !is_supported_format(sample_format) {
            return Err(RecorderError::Configuration(format!(
                "'{}' delivers {:?} samples; only f32, i16 and u16 are supported",
                device_name, sample_format
            )));
        }

        let config: StreamConfig = supported.into();
        log::info!(
            "Input device: {} ({}Hz, {}ch, {:?})",
            device_name,
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        Ok(Self {
            device_name,
            config,
            sample_format,
            max_buffer_frames,
            dropped_buffers: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Buffers dropped because they did not fit the conversion scratch area.
    pub fn dropped_buffers(&self) -> u64 {
        self.dropped_buffers.load(Ordering::Relaxed)
    }

    /// Build and start an input stream that feeds `callback`.
    ///
    /// The recorder receives audio for as long as the returned stream is
    /// alive. Dropping the stream drops the callback, which releases any
    /// pending stop confirmation.
    pub fn start(&self, callback: RenderCallback) -> Result<cpal::Stream, RecorderError> {
        let device = default_input_device()?;
        if device.name().ok().as_deref() != Some(self.device_name.as_str()) {
            log::warn!(
                "Default input device changed since {} was configured",
                self.device_name
            );
        }
        let channels = self.config.channels;

        let stream = match self.sample_format {
            SampleFormat::F32 => {
                let mut callback = callback;
                device.build_input_stream(
                    &self.config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        callback.render(&AudioBuffer::interleaved(data, channels));
                    },
                    |err| log::error!("Audio input stream error: {}", err),
                    None,
                )
            }
            SampleFormat::I16 => self.build_converting::<i16>(&device, callback),
            SampleFormat::U16 => self.build_converting::<u16>(&device, callback),
            other => {
                return Err(RecorderError::Configuration(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        }
        .map_err(|e| {
            RecorderError::Configuration(format!(
                "failed to build input stream on '{}': {}",
                self.device_name, e
            ))
        })?;

        stream.play().map_err(|e| {
            RecorderError::Configuration(format!("failed to start input stream: {}", e))
        })?;
        Ok(stream)
    }

    fn build_converting<T>(
        &self,
        device: &cpal::Device,
        mut callback: RenderCallback,
    ) -> Result<cpal::Stream, cpal::BuildStreamError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let channels = self.config.channels;
        let mut scratch =
            vec![0.0f32; scratch_samples(self.max_buffer_frames, channels)].into_boxed_slice();
        let dropped = Arc::clone(&self.dropped_buffers);
        device.build_input_stream(
            &self.config,
            move |data: &[T], _: &cpal::InputCallbackInfo| match convert_samples(data, &mut scratch) {
                Some(samples) => callback.render(&AudioBuffer::interleaved(samples, channels)),
                None => {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            },
            |err| log::error!("Audio input stream error: {}", err),
            None,
        )
    }
}

impl AudioSource for CpalInput {
    fn stream_format(&self) -> Option<InputStreamFormat> {
        Some(InputStreamFormat::interleaved(
            self.config.sample_rate.0,
            self.config.channels,
        ))
    }
}

fn default_input_device() -> Result<cpal::Device, RecorderError> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| RecorderError::configuration("no default input device"))
}

fn is_supported_format(format: SampleFormat) -> bool {
    matches!(format, SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16)
}

/// Scratch size for a device whose buffers hold at most `max_frames` frames.
fn scratch_samples(max_frames: Option<u32>, channels: u16) -> usize {
    let largest = max_frames.unwrap_or(0) as usize * channels as usize;
    largest.clamp(SCRATCH_SAMPLES, MAX_SCRATCH_SAMPLES)
}

/// Convert `data` to f32 in `scratch`, returning the filled prefix, or
/// `None` when `data` does not fit.
fn convert_samples<'a, T>(data: &[T], scratch: &'a mut [f32]) -> Option<&'a [f32]>
where
    T: Sample,
    f32: FromSample<T>,
{
    let out = scratch.get_mut(..data.len())?;
    for (dst, &src) in out.iter_mut().zip(data) {
        *dst = src.to_sample::<f32>();
    }
    Some(out)
}
