//! Speech-to-text seam
//!
//! One streaming connection per audio source: raw PCM goes in, partial and
//! final text comes out. The event channel closing means the connection is
//! gone; the session then carries on with its remaining sources.

use crate::protocol::AudioSource;
use anyhow::Result;
use tokio::sync::mpsc;

/// Parameters for opening one transcription stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SttRequest {
    pub session_id: String,
    pub source: AudioSource,
    pub sample_rate: u32,
    /// Audio chunks buffered before the sender sees a full queue
    pub queue_depth: usize,
}

/// Text produced by the speech-to-text backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SttEvent {
    /// Whole utterance so far for partials, final text otherwise
    pub text: String,
    pub is_final: bool,
}

impl SttEvent {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Both halves of an open transcription stream
pub struct SttStream {
    /// Raw little-endian i16 PCM chunks
    pub audio: mpsc::Sender<Vec<u8>>,
    pub events: mpsc::Receiver<SttEvent>,
}

/// Streaming speech-to-text service
///
/// Implementations:
/// - NATS: audio on `audio.frame.<session>.<source>`, text on `stt.text.<session>.<source>.*`
/// - In-memory fakes for tests
#[async_trait::async_trait]
pub trait SpeechToText: Send + Sync {
    async fn open(&self, request: SttRequest) -> Result<SttStream>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
