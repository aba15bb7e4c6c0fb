use std::fmt;

use serde::{Deserialize, Serialize};

use super::format::StreamDescriptor;

/// Identifier of a mixer input slot, unique for the lifetime of a mixing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputId(pub(crate) u64);

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input#{}", self.0)
    }
}

/// Direction of an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Input,
    Output,
}

/// An audio endpoint as reported by device enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub is_default: bool,
}

/// Which microphone stream the mixer receives for the current session.
///
/// Resolved once at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MicrophoneVariant {
    Raw,
    EchoCancelled,
}

/// Snapshot of counters for a running (or last) processing session.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDiagnostics {
    pub session_id: String,
    pub started_at: String,
    pub mic_format: Option<StreamDescriptor>,
    pub system_format: Option<StreamDescriptor>,
    pub microphone_variant: Option<MicrophoneVariant>,
    pub mic_callback_count: u64,
    pub system_callback_count: u64,
    pub mic_overflow_drops: u64,
    pub system_overflow_drops: u64,
    pub mic_underruns: u64,
    pub system_underruns: u64,
    pub warnings: Vec<String>,
}
