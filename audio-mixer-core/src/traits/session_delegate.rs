use crate::models::error::MixerError;
use crate::models::state::SessionState;

/// Event delegate for mixer session notifications.
///
/// Methods are called from session-internal threads (the monitor thread or
/// the caller of start/stop), never from the real-time audio thread.
/// Implementations should marshal to the UI thread if needed.
pub trait SessionDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: SessionState);

    /// Called periodically with the microphone peak level (0.0–1.0).
    fn on_microphone_level(&self, level: f32);

    /// Called for conditions the session works around (AEC fallback,
    /// missing system audio).
    fn on_warning(&self, message: &str);

    /// Called when the session fails or stops unexpectedly.
    fn on_error(&self, error: &MixerError);
}
