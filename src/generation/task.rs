use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of generative operation; at most one task per kind runs at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Suggestion,
    Intelligence,
    WordCloud,
    Compliance,
    Todo,
    DiscussionTracker,
    DiscussionSuggestions,
    Summary,
}

impl TaskKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            TaskKind::Suggestion => "suggestion",
            TaskKind::Intelligence => "intelligence",
            TaskKind::WordCloud => "word_cloud",
            TaskKind::Compliance => "compliance",
            TaskKind::Todo => "todo",
            TaskKind::DiscussionTracker => "discussion_tracker",
            TaskKind::DiscussionSuggestions => "discussion_suggestions",
            TaskKind::Summary => "summary",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of one started task, unique within a runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    pub kind: TaskKind,
    pub seq: u64,
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind, self.seq)
    }
}

/// Progress of an in-flight task; finished tasks leave the runner's table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for the backend to accept the request
    Pending,
    /// Backend stream open, chunks arriving
    Streaming,
}
