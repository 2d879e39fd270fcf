use super::reports::{ComplianceFlag, IntelligenceReport, PostCallReport, Topic};
use crate::tracker::DiscussionPoint;
use serde::{Deserialize, Serialize};

fn default_sources() -> Vec<String> {
    vec!["mic".to_string()]
}

/// How audio sources map to speakers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Separate mic/room streams, speaker known from the source tag
    #[default]
    Live,
    /// One recorded conversation on the room source, speakers alternate per turn
    Simulation,
}

/// Control message sent by the client as a JSON text frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Config {
        /// Falls back to the server's configured default when absent
        #[serde(rename = "sampleRate", default)]
        sample_rate: Option<u32>,
        #[serde(default = "default_sources")]
        sources: Vec<String>,
        #[serde(default)]
        mode: SessionMode,
    },
    Ping,
    ClientContext {
        client_id: String,
        #[serde(default)]
        discussion_points: Vec<String>,
    },
    SetDiscussionPoints {
        #[serde(default)]
        discussion_points: Vec<String>,
    },
    RequestDiscussionSuggestions,
    CoachingMode {
        #[serde(default)]
        enabled: bool,
    },
    GenerateSummary,
}

impl ClientMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Event pushed to the client as a JSON text frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Pong,
    Transcript {
        text: String,
        is_final: bool,
        speaker: String,
    },
    SuggestionStart {
        id: String,
    },
    SuggestionChunk {
        id: String,
        text: String,
    },
    SuggestionDone {
        id: String,
        had_suggestion: bool,
    },
    IntelligenceUpdate(IntelligenceReport),
    WordCloudUpdate {
        topics: Vec<Topic>,
    },
    DiscussionTrackerUpdate {
        points: Vec<DiscussionPoint>,
        nudge: String,
    },
    DiscussionSuggestions {
        points: Vec<String>,
    },
    ComplianceAlert(ComplianceFlag),
    TodoUpdate {
        items: Vec<String>,
    },
    PostCallSummary {
        #[serde(flatten)]
        report: Option<Box<PostCallReport>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Status {
        message: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn status(message: impl Into<String>) -> Self {
        ServerEvent::Status {
            message: message.into(),
        }
    }

    pub fn summary_failed(error: impl Into<String>) -> Self {
        ServerEvent::PostCallSummary {
            report: None,
            error: Some(error.into()),
        }
    }

    /// Wire name of this event (the `type` field)
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Pong => "pong",
            ServerEvent::Transcript { .. } => "transcript",
            ServerEvent::SuggestionStart { .. } => "suggestion_start",
            ServerEvent::SuggestionChunk { .. } => "suggestion_chunk",
            ServerEvent::SuggestionDone { .. } => "suggestion_done",
            ServerEvent::IntelligenceUpdate(_) => "intelligence_update",
            ServerEvent::WordCloudUpdate { .. } => "word_cloud_update",
            ServerEvent::DiscussionTrackerUpdate { .. } => "discussion_tracker_update",
            ServerEvent::DiscussionSuggestions { .. } => "discussion_suggestions",
            ServerEvent::ComplianceAlert(_) => "compliance_alert",
            ServerEvent::TodoUpdate { .. } => "todo_update",
            ServerEvent::PostCallSummary { .. } => "post_call_summary",
            ServerEvent::Status { .. } => "status",
            ServerEvent::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
