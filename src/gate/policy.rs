use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cooldown and growth threshold for one gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Minimum time between fires, in milliseconds (0 = no cooldown)
    pub cooldown_ms: u64,

    /// Minimum transcript growth since the last fire, in characters
    pub min_new_chars: usize,
}

impl GatePolicy {
    pub const fn new(cooldown_ms: u64, min_new_chars: usize) -> Self {
        Self {
            cooldown_ms,
            min_new_chars,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Per-gate policies for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    pub suggestion: GatePolicy,
    pub intelligence: GatePolicy,
    pub word_cloud: GatePolicy,
    pub compliance: GatePolicy,
    pub todo: GatePolicy,
    pub tracker: GatePolicy,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            suggestion: GatePolicy::new(6_000, 60),
            intelligence: GatePolicy::new(8_000, 50),
            word_cloud: GatePolicy::new(5_000, 40),
            compliance: GatePolicy::new(5_000, 40),
            todo: GatePolicy::new(6_000, 40),
            // Fires on every committed final while points are tracked
            tracker: GatePolicy::new(0, 0),
        }
    }
}
