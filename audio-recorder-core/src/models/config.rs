use std::time::Duration;

/// Tuning for the control side of a recorder.
///
/// None of these values are read by the render callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Sleep between polls of the confirmation flag in `stop()` (default: 1 ms).
    pub stop_poll_interval: Duration,

    /// How many buffer periods `stop()` waits for the callback to confirm
    /// before failing with a timeout (default: 8).
    pub stop_timeout_periods: u32,

    /// Lower bound on the stop timeout, used before any buffer has been
    /// seen and for very short buffers (default: 250 ms).
    pub min_stop_timeout: Duration,

    /// Write a `<file>.metadata.json` sidecar next to each finished recording.
    pub write_metadata: bool,

    /// Capacity of the writer's in-memory buffer in bytes (default: 64 KiB).
    pub writer_buffer_bytes: usize,
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.stop_poll_interval.is_zero() {
            return Err("stop poll interval must be non-zero".into());
        }
        if self.stop_timeout_periods == 0 {
            return Err("stop timeout must cover at least one buffer period".into());
        }
        if self.min_stop_timeout < self.stop_poll_interval {
            return Err(format!(
                "minimum stop timeout {:?} is shorter than the poll interval {:?}",
                self.min_stop_timeout, self.stop_poll_interval
            ));
        }
        if self.writer_buffer_bytes == 0 {
            return Err("writer buffer capacity must be non-zero".into());
        }
        Ok(())
    }

    /// Stop timeout for a given buffer period.
    pub fn stop_timeout(&self, buffer_period: Option<Duration>) -> Duration {
        let scaled = buffer_period
            .map(|period| period * self.stop_timeout_periods)
            .unwrap_or(Duration::ZERO);
        scaled.max(self.min_stop_timeout)
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            stop_poll_interval: Duration::from_millis(1),
            stop_timeout_periods: 8,
            min_stop_timeout: Duration::from_millis(250),
            write_metadata: false,
            writer_buffer_bytes: 64 * 1024,
        }
    }
}
