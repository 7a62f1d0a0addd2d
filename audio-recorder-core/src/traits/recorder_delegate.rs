use crate::models::error::RecorderError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::RecorderState;

/// Event delegate for recorder notifications.
///
/// All methods are called on the control thread, from inside
/// `queue`/`record`/`stop`. The render callback never calls them.
pub trait RecorderDelegate: Send + Sync {
    /// Called after every state transition.
    fn on_state_changed(&self, _state: RecorderState) {}

    /// Called for non-fatal conditions such as redundant `queue`, `record`
    /// or `stop` calls.
    fn on_warning(&self, message: &str);

    /// Called when an operation fails, before the error is returned.
    fn on_error(&self, _error: &RecorderError) {}

    /// Called when a recording is finalized successfully.
    fn on_recording_finished(&self, _result: &RecordingResult) {}
}
