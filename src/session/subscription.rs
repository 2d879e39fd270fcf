use crate::protocol::AudioSource;
use crate::stt::{SpeechToText, SttEvent, SttRequest};
use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What a subscription reports back to its session
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSignal {
    Transcript(AudioSource, SttEvent),
    /// The upstream connection is gone; no more events for this source
    Ended(AudioSource),
}

/// One streaming transcription connection for one audio source
pub struct TranscriptionSubscription {
    source: AudioSource,
    audio: Option<mpsc::Sender<Vec<u8>>>,
    forwarder: JoinHandle<()>,
    frames_sent: u64,
    frames_dropped: u64,
}

impl TranscriptionSubscription {
    /// Open the upstream stream and start forwarding its events as signals
    pub async fn open(
        stt: &dyn SpeechToText,
        request: SttRequest,
        signals: mpsc::Sender<SourceSignal>,
    ) -> Result<Self> {
        let source = request.source;
        let stream = stt
            .open(request)
            .await
            .with_context(|| format!("Failed to open {} transcription on {}", source, stt.name()))?;

        let mut events = stream.events;
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if signals
                    .send(SourceSignal::Transcript(source, event))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            debug!("Transcription events ended [{}]", source);
            let _ = signals.send(SourceSignal::Ended(source)).await;
        });

        info!("Transcription subscription opened [{}]", source);

        Ok(Self {
            source,
            audio: Some(stream.audio),
            forwarder,
            frames_sent: 0,
            frames_dropped: 0,
        })
    }

    pub fn source(&self) -> AudioSource {
        self.source
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Queue PCM for the upstream connection without waiting.
    ///
    /// A full queue drops the frame so one slow source never stalls the
    /// other. Returns `false` once the upstream side has gone away.
    pub fn send(&mut self, pcm: Vec<u8>) -> bool {
        let Some(audio) = &self.audio else {
            return false;
        };

        match audio.try_send(pcm) {
            Ok(()) => {
                self.frames_sent += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.frames_dropped += 1;
                if self.frames_dropped.is_power_of_two() {
                    warn!(
                        "Audio queue full [{}], {} frames dropped so far",
                        self.source, self.frames_dropped
                    );
                }
                true
            }
            Err(TrySendError::Closed(_)) => {
                self.audio = None;
                false
            }
        }
    }

    /// Stop sending audio and stop forwarding events
    pub fn close(&mut self) {
        if self.audio.take().is_some() {
            info!(
                "Closing transcription subscription [{}] (sent={}, dropped={})",
                self.source, self.frames_sent, self.frames_dropped
            );
        }
        self.forwarder.abort();
    }
}

impl Drop for TranscriptionSubscription {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}
