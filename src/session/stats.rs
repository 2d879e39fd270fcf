use crate::protocol::{AudioSource, SessionMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one client connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Socket open, waiting for the `config` message
    #[default]
    Connecting,
    Active,
    /// Summary requested; only its result is still awaited
    Summarizing,
    Closed,
}

/// Statistics about an advisor session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: SessionState,

    pub mode: SessionMode,

    /// Sources with a live transcription subscription
    pub sources: Vec<AudioSource>,

    /// Client the call is about, if context was provided
    pub client_id: Option<String>,

    /// When the connection was accepted
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Number of final transcript lines committed
    pub committed_lines: usize,

    /// Rendered transcript length in characters
    pub transcript_chars: usize,

    /// Generative tasks currently in flight
    pub active_tasks: usize,

    /// Audio frames dropped because a source queue was full
    pub dropped_frames: u64,
}

impl SessionStats {
    pub fn new(session_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            state: SessionState::Connecting,
            mode: SessionMode::Live,
            sources: Vec::new(),
            client_id: None,
            started_at,
            duration_secs: 0.0,
            committed_lines: 0,
            transcript_chars: 0,
            active_tasks: 0,
            dropped_frames: 0,
        }
    }
}
