use super::clock::Clock;
use super::policy::{GatePolicy, GateSettings};
use crate::generation::TaskKind;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Cooldown/threshold state machine for one kind of generative task
#[derive(Debug, Clone)]
pub struct Gate {
    pub kind: TaskKind,
    policy: GatePolicy,
    last_fired_at: Option<Instant>,
    chars_at_last_fire: usize,
    /// Next evaluation ignores the cooldown (set after a critical finding)
    bypass_cooldown: bool,
}

impl Gate {
    pub fn new(kind: TaskKind, policy: GatePolicy) -> Self {
        Self {
            kind,
            policy,
            last_fired_at: None,
            chars_at_last_fire: 0,
            bypass_cooldown: false,
        }
    }

    pub fn policy(&self) -> GatePolicy {
        self.policy
    }

    pub fn last_fired_at(&self) -> Option<Instant> {
        self.last_fired_at
    }

    pub fn chars_at_last_fire(&self) -> usize {
        self.chars_at_last_fire
    }

    /// Whether the gate would fire at `now` with `total_chars` committed
    pub fn is_open(&self, now: Instant, total_chars: usize) -> bool {
        let grown = total_chars.saturating_sub(self.chars_at_last_fire);
        if grown < self.policy.min_new_chars {
            return false;
        }

        match self.last_fired_at {
            None => true,
            Some(_) if self.bypass_cooldown => true,
            Some(at) => now.saturating_duration_since(at) >= self.policy.cooldown(),
        }
    }

    pub fn record_fire(&mut self, now: Instant, total_chars: usize) {
        self.last_fired_at = Some(now);
        self.chars_at_last_fire = total_chars;
        self.bypass_cooldown = false;
    }

    pub fn bypass_next_cooldown(&mut self) {
        self.bypass_cooldown = true;
    }
}

/// The family of transcript-driven gates for one session.
///
/// Evaluation is a plain `&mut self` call made from the session loop, so gate
/// state never sees concurrent mutation.
pub struct GatingEngine {
    clock: Arc<dyn Clock>,
    gates: Vec<Gate>,
}

impl GatingEngine {
    /// Gates evaluated on each commit, in evaluation order
    pub const GATED_KINDS: [TaskKind; 6] = [
        TaskKind::Suggestion,
        TaskKind::Intelligence,
        TaskKind::Compliance,
        TaskKind::Todo,
        TaskKind::WordCloud,
        TaskKind::DiscussionTracker,
    ];

    pub fn new(settings: &GateSettings, clock: Arc<dyn Clock>) -> Self {
        let gates = Self::GATED_KINDS
            .iter()
            .map(|&kind| {
                let policy = match kind {
                    TaskKind::Suggestion => settings.suggestion,
                    TaskKind::Intelligence => settings.intelligence,
                    TaskKind::Compliance => settings.compliance,
                    TaskKind::Todo => settings.todo,
                    TaskKind::WordCloud => settings.word_cloud,
                    _ => settings.tracker,
                };
                Gate::new(kind, policy)
            })
            .collect();

        Self { clock, gates }
    }

    pub fn gate(&self, kind: TaskKind) -> Option<&Gate> {
        self.gates.iter().find(|g| g.kind == kind)
    }

    /// Decide which kinds fire after a commit and record their fires.
    ///
    /// `is_busy` reports kinds with a task already in flight; an open gate for
    /// a busy kind is left untouched so it can fire once the task finishes.
    /// The tracker gate only takes part while `tracker_active` is set.
    pub fn evaluate(
        &mut self,
        total_chars: usize,
        tracker_active: bool,
        is_busy: impl Fn(TaskKind) -> bool,
    ) -> Vec<TaskKind> {
        if total_chars == 0 {
            return Vec::new();
        }

        let now = self.clock.now();
        let mut fired = Vec::new();

        for gate in &mut self.gates {
            if gate.kind == TaskKind::DiscussionTracker && !tracker_active {
                continue;
            }
            if !gate.is_open(now, total_chars) {
                continue;
            }
            if is_busy(gate.kind) {
                debug!("Gate {} open but task in flight, skipping", gate.kind);
                continue;
            }

            debug!(
                "Gate {} fired (new_chars={})",
                gate.kind,
                total_chars.saturating_sub(gate.chars_at_last_fire)
            );
            gate.record_fire(now, total_chars);
            fired.push(gate.kind);
        }

        fired
    }

    /// Let the compliance gate skip its cooldown on the next evaluation
    pub fn escalate_compliance(&mut self) {
        if let Some(gate) = self.gates.iter_mut().find(|g| g.kind == TaskKind::Compliance) {
            gate.bypass_next_cooldown();
        }
    }
}
