use crate::gate::GateSettings;
use crate::generation::TaskTimeouts;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-session tuning, shared by every connection the server accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Sample rate assumed when the client's config omits one
    pub default_sample_rate: u32,

    /// Frames buffered per source before new audio is dropped
    pub audio_queue_depth: usize,

    /// Hard bound on summary generation, in milliseconds
    pub summary_timeout_ms: u64,

    /// Bound on every other generative task, in milliseconds
    pub generation_timeout_ms: u64,

    pub gates: GateSettings,
}

impl SessionSettings {
    pub fn timeouts(&self) -> TaskTimeouts {
        TaskTimeouts {
            default: Duration::from_millis(self.generation_timeout_ms),
            summary: Duration::from_millis(self.summary_timeout_ms),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_sample_rate: 24000,
            audio_queue_depth: 64,
            summary_timeout_ms: 30_000,
            generation_timeout_ms: 45_000,
            gates: GateSettings::default(),
        }
    }
}
