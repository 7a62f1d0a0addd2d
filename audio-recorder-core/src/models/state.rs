use std::fmt;

/// Recorder lifecycle state machine.
///
/// State transitions:
/// ```text
/// idle ─queue→ queued ─record→ recording ─stop→ stopping → idle
///   └───record (queues first)───↗
/// queued ─stop→ stopping → idle
/// ```
///
/// Stored as a single byte so the render callback can read it with one
/// atomic load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum RecorderState {
    #[default]
    Idle = 0,
    Queued = 1,
    Recording = 2,
    Stopping = 3,
}

impl RecorderState {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a value previously produced by [`RecorderState::as_u8`].
    ///
    /// Unknown values decode as `Idle`, which the render callback treats as
    /// pass-through.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Queued,
            2 => Self::Recording,
            3 => Self::Stopping,
            _ => Self::Idle,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::Stopping)
    }

    /// Whether a file handle is open in this state.
    pub fn has_open_file(&self) -> bool {
        !self.is_idle()
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
