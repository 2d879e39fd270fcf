use super::messages::{
    AudioFrameMessage, GenerationChunkMessage, GenerationRequestMessage, TranscriptMessage,
};
use crate::generation::{ChunkStream, GenerationBackend, GenerationError, GenerationRequest};
use crate::protocol::AudioSource;
use crate::stt::{SpeechToText, SttEvent, SttRequest, SttStream};
use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use base64::Engine;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Queue depth between the session and the NATS publisher/subscriber tasks
const STREAM_CHANNEL_DEPTH: usize = 64;

/// NATS bus client serving both transcription and generation
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    /// Publish one audio frame for a session source
    pub async fn publish_audio_frame(
        &self,
        session_id: &str,
        source: AudioSource,
        pcm_bytes: &[u8],
        sample_rate: u32,
        sequence: u32,
        is_final: bool,
    ) -> Result<()> {
        let subject = format!("audio.frame.{}.{}", session_id, source);

        let message = AudioFrameMessage {
            session_id: session_id.to_string(),
            source,
            sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            sample_rate,
            channels: 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: is_final,
        };

        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish audio frame")?;

        debug!(
            "Published audio frame to {} (seq={}, bytes={}, final={})",
            subject,
            sequence,
            pcm_bytes.len(),
            is_final
        );

        Ok(())
    }

    /// Subscribe to transcript messages for one session source
    pub async fn subscribe_transcripts(
        &self,
        session_id: &str,
        source: AudioSource,
    ) -> Result<Subscriber> {
        // The STT service publishes to stt.text.<session>.<source>.{partial,final}
        let subject = format!("stt.text.{}.{}.>", session_id, source);

        info!("Subscribing to transcripts on {}", subject);

        let subscriber = self
            .client
            .subscribe(subject)
            .await
            .context("Failed to subscribe to transcripts")?;

        Ok(subscriber)
    }
}

#[async_trait::async_trait]
impl SpeechToText for NatsClient {
    async fn open(&self, request: SttRequest) -> Result<SttStream> {
        let mut subscriber = self
            .subscribe_transcripts(&request.session_id, request.source)
            .await?;

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(request.queue_depth.max(1));
        let (events_tx, events_rx) = mpsc::channel::<SttEvent>(STREAM_CHANNEL_DEPTH);

        let publisher = self.clone();
        let SttRequest {
            session_id,
            source,
            sample_rate,
            ..
        } = request;

        let publish_session = session_id.clone();
        tokio::spawn(async move {
            let mut sequence: u32 = 0;

            while let Some(pcm) = audio_rx.recv().await {
                if let Err(e) = publisher
                    .publish_audio_frame(&publish_session, source, &pcm, sample_rate, sequence, false)
                    .await
                {
                    warn!("Failed to publish audio frame [{}]: {}", source, e);
                }
                sequence = sequence.wrapping_add(1);
            }

            // Session dropped its sender: tell the STT service the stream is over
            if let Err(e) = publisher
                .publish_audio_frame(&publish_session, source, &[], sample_rate, sequence, true)
                .await
            {
                warn!("Failed to send final frame [{}]: {}", source, e);
            }
            debug!("Audio publisher stopped [{}]", source);
        });

        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    msg = subscriber.next() => msg,
                    _ = events_tx.closed() => break,
                };
                let Some(msg) = msg else {
                    warn!("Transcript subscription ended [{}]", source);
                    break;
                };

                let transcript = match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("Failed to parse transcript message: {}", e);
                        continue;
                    }
                };
                if transcript.session_id != session_id || transcript.source != source {
                    continue;
                }

                let event = SttEvent {
                    text: transcript.text,
                    is_final: !transcript.partial,
                };
                if events_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(SttStream {
            audio: audio_tx,
            events: events_rx,
        })
    }

    fn name(&self) -> &str {
        "nats-stt"
    }
}

#[async_trait::async_trait]
impl GenerationBackend for NatsClient {
    async fn generate(&self, request: GenerationRequest) -> Result<ChunkStream, GenerationError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let inbox = self.client.new_inbox();

        // Subscribe before publishing so no chunk can be missed
        let subscriber = self
            .client
            .subscribe(inbox.clone())
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let subject = format!("llm.generate.{}", request.kind);
        let message = GenerationRequestMessage {
            request_id: request_id.clone(),
            kind: request.kind,
            context: request.context,
        };
        let payload =
            serde_json::to_vec(&message).map_err(|e| GenerationError::Malformed(e.to_string()))?;

        self.client
            .publish_with_reply(subject.clone(), inbox, payload.into())
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        debug!("Published generation request {} to {}", request_id, subject);

        Ok(reply_stream(subscriber, request_id))
    }

    fn name(&self) -> &str {
        "nats-llm"
    }
}

/// Turn reply-inbox messages into a chunk stream that ends on `done`
fn reply_stream(subscriber: Subscriber, request_id: String) -> ChunkStream {
    futures::stream::unfold(Some(subscriber), move |state| {
        let request_id = request_id.clone();
        async move {
            let mut subscriber = state?;
            loop {
                let Some(msg) = subscriber.next().await else {
                    let err = GenerationError::Transport("reply stream closed".to_string());
                    return Some((Err(err), None));
                };

                let chunk = match serde_json::from_slice::<GenerationChunkMessage>(&msg.payload) {
                    Ok(chunk) => chunk,
                    Err(e) => return Some((Err(GenerationError::Malformed(e.to_string())), None)),
                };
                if !chunk.request_id.is_empty() && chunk.request_id != request_id {
                    continue;
                }
                if let Some(error) = chunk.error {
                    return Some((Err(GenerationError::Backend(error)), None));
                }

                let text = chunk.text.filter(|t| !t.is_empty());
                match (text, chunk.done) {
                    (Some(text), true) => return Some((Ok(text), None)),
                    (None, true) => return None,
                    (Some(text), false) => return Some((Ok(text), Some(subscriber))),
                    (None, false) => continue,
                }
            }
        }
    })
    .boxed()
}
