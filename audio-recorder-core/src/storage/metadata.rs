use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::FileIoError;
use crate::models::recording_result::RecordingMetadata;

/// Path of the JSON sidecar for a recording: `{recording}.metadata.json`.
pub fn metadata_path(recording_path: &Path) -> PathBuf {
    let mut name = recording_path.as_os_str().to_owned();
    name.push(".metadata.json");
    PathBuf::from(name)
}

/// Write recording metadata as a JSON sidecar file.
pub fn write_metadata(
    metadata: &RecordingMetadata,
    recording_path: &Path,
) -> Result<PathBuf, FileIoError> {
    let path = metadata_path(recording_path);
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| metadata_error(&path, format!("serialize failed: {}", e)))?;
    fs::write(&path, json).map_err(|e| metadata_error(&path, e.to_string()))?;
    Ok(path)
}

fn metadata_error(path: &Path, reason: String) -> FileIoError {
    FileIoError::Metadata {
        path: path.display().to_string(),
        reason,
    }
}

/// Read recording metadata from a JSON sidecar file.
pub fn read_metadata(recording_path: &Path) -> Result<RecordingMetadata, String> {
    let path = metadata_path(recording_path);
    let json = fs::read_to_string(&path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&json).map_err(|e| format!("failed to parse {}: {}", path.display(), e))
}
