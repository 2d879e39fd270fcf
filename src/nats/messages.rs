use crate::generation::TaskKind;
use crate::protocol::AudioSource;
use serde::{Deserialize, Serialize};

/// Audio frame message published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub source: AudioSource,
    pub sequence: u32,
    pub pcm: String, // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Transcript message received from STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub source: AudioSource,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Generation request published on `llm.generate.<kind>`
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRequestMessage {
    pub request_id: String,
    pub kind: TaskKind,
    pub context: serde_json::Value,
}

/// One streamed piece of a generation response, sent to the reply inbox
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationChunkMessage {
    pub request_id: String,
    pub text: Option<String>,
    pub done: bool,
    pub error: Option<String>,
}
