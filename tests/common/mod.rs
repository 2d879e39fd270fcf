// In-memory collaborators shared by the integration tests
#![allow(dead_code)]

use anyhow::Result;
use callpilot::crm::{ClientDirectory, ClientRecord, MemoryNotesStore};
use callpilot::gate::{GatePolicy, ManualClock};
use callpilot::generation::{
    ChunkStream, GenerationBackend, GenerationError, GenerationRequest, TaskKind,
};
use callpilot::protocol::{AudioSource, ServerEvent};
use callpilot::session::{AdvisorSession, Inbound, SessionDeps, SessionSettings, SessionStats};
use callpilot::stt::{SpeechToText, SttEvent, SttRequest, SttStream};
use futures::StreamExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

/// Upper bound on waiting for any one event; generous so paused-clock tests
/// reach their own timers first
const EVENT_WAIT: Duration = Duration::from_secs(600);

// ============================================================================
// Speech-to-text
// ============================================================================

/// What a scripted transcription stream does with each audio chunk it receives
#[derive(Debug, Clone)]
pub enum SttStep {
    /// Emit a partial of the first word, then the final text
    Say(&'static str),
    /// Drop the connection
    Fail,
}

#[derive(Default)]
pub struct ScriptedStt {
    scripts: Mutex<HashMap<AudioSource, VecDeque<SttStep>>>,
    unavailable: HashSet<AudioSource>,
    opened: Mutex<Vec<SttRequest>>,
}

impl ScriptedStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, source: AudioSource, steps: Vec<SttStep>) -> Self {
        self.scripts.lock().unwrap().insert(source, steps.into());
        self
    }

    pub fn unavailable(mut self, source: AudioSource) -> Self {
        self.unavailable.insert(source);
        self
    }

    pub fn opened(&self) -> Vec<SttRequest> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SpeechToText for ScriptedStt {
    async fn open(&self, request: SttRequest) -> Result<SttStream> {
        if self.unavailable.contains(&request.source) {
            anyhow::bail!("connection refused");
        }

        let mut steps = self
            .scripts
            .lock()
            .unwrap()
            .remove(&request.source)
            .unwrap_or_default();
        let depth = request.queue_depth.max(1);
        self.opened.lock().unwrap().push(request);

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(depth);
        let (events_tx, events_rx) = mpsc::channel(16);

        tokio::spawn(async move {
            while audio_rx.recv().await.is_some() {
                match steps.pop_front() {
                    Some(SttStep::Say(text)) => {
                        let first_word = text.split_whitespace().next().unwrap_or_default();
                        let _ = events_tx.send(SttEvent::partial(first_word)).await;
                        let _ = events_tx.send(SttEvent::final_text(text)).await;
                    }
                    Some(SttStep::Fail) => return,
                    None => {}
                }
            }
        });

        Ok(SttStream {
            audio: audio_tx,
            events: events_rx,
        })
    }

    fn name(&self) -> &str {
        "scripted-stt"
    }
}

// ============================================================================
// Generation
// ============================================================================

#[derive(Debug, Clone)]
pub enum Reply {
    Chunks(Vec<&'static str>),
    Fail(GenerationError),
    /// Never produces anything
    Hang,
    /// Streams the chunks once the gate is notified
    Held(Arc<Notify>, Vec<&'static str>),
}

/// Replies are used in order per kind; the last one repeats
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<HashMap<TaskKind, VecDeque<Reply>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, kind: TaskKind, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests_for(&self, kind: TaskKind) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl GenerationBackend for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<ChunkStream, GenerationError> {
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(&request.kind) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        }
        .unwrap_or(Reply::Chunks(Vec::new()));
        self.requests.lock().unwrap().push(request);

        match reply {
            Reply::Chunks(chunks) => Ok(futures::stream::iter(
                chunks.into_iter().map(|c| Ok(c.to_string())),
            )
            .boxed()),
            Reply::Fail(e) => Err(e),
            Reply::Hang => Ok(futures::stream::pending().boxed()),
            Reply::Held(gate, chunks) => Ok(futures::stream::once(async move {
                gate.notified().await;
                futures::stream::iter(chunks.into_iter().map(|c| Ok(c.to_string())))
            })
            .flatten()
            .boxed()),
        }
    }

    fn name(&self) -> &str {
        "scripted-llm"
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Let spawned tasks finish work that produces no event to wait on
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn sample_client() -> ClientRecord {
    serde_json::from_value(serde_json::json!({
        "id": "client-chen",
        "name": "Chen Household",
        "primary_contact": "Linda Chen",
        "client_tier": "Premier",
        "total_aum": 2400000.0,
        "risk_profile": "Moderate",
        "next_review_due": "2025-11-15",
        "accounts": [
            {"name": "Joint Brokerage", "type": "Taxable", "value": 1500000.0}
        ],
        "gps_goals": [
            {"name": "College", "current_progress": 62.0, "target": 400000.0,
             "timeline": "2031", "on_track": true}
        ],
        "past_conversations": [
            {"date": "2025-06-01", "summary": "Discussed 529 funding"}
        ]
    }))
    .unwrap()
}

/// Gates that never fire, so tests only see the engines they enable
pub fn quiet_settings() -> SessionSettings {
    let mut settings = SessionSettings::default();
    let never = GatePolicy::new(0, usize::MAX);
    settings.gates.suggestion = never;
    settings.gates.intelligence = never;
    settings.gates.word_cloud = never;
    settings.gates.compliance = never;
    settings.gates.todo = never;
    settings
}

// ============================================================================
// Session harness
// ============================================================================

pub struct Harness {
    pub inbound: futures::channel::mpsc::UnboundedSender<Inbound>,
    pub events: mpsc::Receiver<ServerEvent>,
    pub session: JoinHandle<SessionStats>,
    pub stt: Arc<ScriptedStt>,
    pub generator: Arc<ScriptedGenerator>,
    pub notes: Arc<MemoryNotesStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn start(stt: ScriptedStt, generator: ScriptedGenerator, settings: SessionSettings) -> Self {
        let stt = Arc::new(stt);
        let generator = Arc::new(generator);
        let notes = Arc::new(MemoryNotesStore::new());
        let clock = Arc::new(ManualClock::new());

        let deps = SessionDeps {
            stt: stt.clone(),
            generator: generator.clone(),
            clients: Arc::new(ClientDirectory::from_records(vec![sample_client()])),
            notes: notes.clone(),
            clock: clock.clone(),
            settings,
        };

        let (inbound, inbound_rx) = futures::channel::mpsc::unbounded();
        let (events_tx, events) = mpsc::channel(256);
        let session = AdvisorSession::new("test-session", deps, events_tx);
        let session = tokio::spawn(session.run(inbound_rx));

        Self {
            inbound,
            events,
            session,
            stt,
            generator,
            notes,
            clock,
        }
    }

    pub fn send_text(&self, json: serde_json::Value) {
        self.inbound
            .unbounded_send(Inbound::Text(json.to_string()))
            .unwrap();
    }

    pub fn send_audio(&self, frame: Vec<u8>) {
        self.inbound.unbounded_send(Inbound::Binary(frame)).unwrap();
    }

    pub fn close(&self) {
        self.inbound.unbounded_send(Inbound::Close).unwrap();
    }

    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        tokio::time::timeout(EVENT_WAIT, self.events.recv())
            .await
            .expect("timed out waiting for a session event")
    }

    /// Skip ahead to the next event of the given wire type
    pub async fn next_of(&mut self, kind: &str) -> ServerEvent {
        loop {
            let event = self
                .next_event()
                .await
                .unwrap_or_else(|| panic!("session ended before a {} event", kind));
            if event.kind() == kind {
                return event;
            }
        }
    }

    /// Next committed transcript line as `(speaker, text)`
    pub async fn next_final_transcript(&mut self) -> (String, String) {
        loop {
            if let ServerEvent::Transcript {
                text,
                is_final: true,
                speaker,
            } = self.next_of("transcript").await
            {
                return (speaker, text);
            }
        }
    }

    /// Drain everything until the session closes its event channel
    pub async fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }
}
