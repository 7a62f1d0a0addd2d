use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::audio_models::OutputFileFormat;

/// Result returned by `stop()` once a recording is finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub frames_written: u64,
    pub duration_secs: f64,
    pub metadata: RecordingMetadata,
    pub checksum: Option<String>,
}

/// Metadata stored alongside a recording.
///
/// Serializable for the JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub file_path: String,
    pub format: OutputFileFormat,
    pub frames: u64,
    pub duration_secs: f64,
    pub checksum: Option<String>,
    pub created_at: String,
}

impl RecordingMetadata {
    pub fn new(
        file_path: &str,
        format: OutputFileFormat,
        frames: u64,
        checksum: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_path: file_path.to_string(),
            format,
            frames,
            duration_secs: frames as f64 / format.sample_rate as f64,
            checksum,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
