use super::config::SessionSettings;
use super::profile::AccumulatedProfile;
use super::stats::{SessionState, SessionStats};
use super::subscription::{SourceSignal, TranscriptionSubscription};
use super::suggestion::{is_no_suggestion, SuggestionStream, SUGGESTION_MEMORY};
use crate::crm::{ClientDirectory, ClientRecord, NotesStore};
use crate::gate::{Clock, GatingEngine};
use crate::generation::{
    GenerationBackend, TaskEvent, TaskId, TaskKind, TaskOutcome, TaskRunner, TaskUpdate,
};
use crate::protocol::{
    parse_json_response, AudioPacket, AudioSource, ClientMessage, ComplianceScan,
    IntelligenceReport, PointList, PostCallReport, ServerEvent, SessionMode, Severity, TodoList,
    WordCloud,
};
use crate::stt::{SpeechToText, SttEvent, SttRequest};
use crate::tracker::{DiscussionTracker, PointOrigin, TrackerAssessment};
use crate::transcript::{Checkpoint, Observation, TranscriptAssembler, TranscriptEvent};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Queue depth between transcription forwarders and the session loop
const SIGNAL_CHANNEL_DEPTH: usize = 256;

/// Speaker labels alternated per final line in simulation mode
const SIMULATION_SPEAKERS: [&str; 2] = ["Advisor", "Client"];

/// A message read from the client transport
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Binary(Vec<u8>),
    Text(String),
    /// The client closed the connection
    Close,
}

/// Collaborators and settings a session is built from
#[derive(Clone)]
pub struct SessionDeps {
    pub stt: Arc<dyn SpeechToText>,
    pub generator: Arc<dyn GenerationBackend>,
    pub clients: Arc<ClientDirectory>,
    pub notes: Arc<dyn NotesStore>,
    pub clock: Arc<dyn Clock>,
    pub settings: SessionSettings,
}

/// What the engines remember between runs within one call
#[derive(Debug, Default)]
struct EngineMemory {
    suggestions: VecDeque<String>,
    compliance_keys: HashSet<String>,
    compliance_issues: Vec<String>,
    todo_keys: HashSet<String>,
    todos: Vec<String>,
}

/// A tracker evaluation in flight: the list it was asked about and the
/// transcript position it covers
#[derive(Debug, Clone, Copy)]
struct TrackerRun {
    id: TaskId,
    epoch: u64,
    checkpoint: Checkpoint,
}

fn dedup_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One client connection: protocol multiplexing, transcription fan-out,
/// transcript assembly, gating and the reactive engines.
///
/// All state is owned by the task running [`AdvisorSession::run`]; transcription
/// forwarders and generative tasks report back over channels.
pub struct AdvisorSession {
    id: String,
    deps: SessionDeps,
    state: SessionState,
    started_at: DateTime<Utc>,

    sample_rate: u32,
    mode: SessionMode,
    coaching: bool,
    client: Option<ClientRecord>,

    subscriptions: HashMap<AudioSource, TranscriptionSubscription>,
    /// Frames dropped by subscriptions that have since gone away
    retired_drops: u64,
    signals_tx: mpsc::Sender<SourceSignal>,
    signals_rx: mpsc::Receiver<SourceSignal>,

    assembler: TranscriptAssembler,
    gates: GatingEngine,
    runner: TaskRunner,
    task_events: mpsc::UnboundedReceiver<TaskEvent>,

    tracker: DiscussionTracker,
    /// Transcript position the tracker has successfully evaluated up to
    tracker_checkpoint: Checkpoint,
    /// Bumped whenever the point list is replaced
    tracker_epoch: u64,
    tracker_run: Option<TrackerRun>,
    profile: AccumulatedProfile,
    memory: EngineMemory,
    suggestion: Option<SuggestionStream>,
    summary_task: Option<TaskId>,
    simulation_turn: usize,

    outbound: mpsc::Sender<ServerEvent>,
    outbound_open: bool,
    stats_tx: watch::Sender<SessionStats>,
}

impl AdvisorSession {
    pub fn new(
        session_id: impl Into<String>,
        deps: SessionDeps,
        outbound: mpsc::Sender<ServerEvent>,
    ) -> Self {
        let id = session_id.into();
        let started_at = Utc::now();

        let (signals_tx, signals_rx) = mpsc::channel(SIGNAL_CHANNEL_DEPTH);
        let gates = GatingEngine::new(&deps.settings.gates, Arc::clone(&deps.clock));
        let (runner, task_events) =
            TaskRunner::new(Arc::clone(&deps.generator), deps.settings.timeouts());
        let (stats_tx, _) = watch::channel(SessionStats::new(id.clone(), started_at));

        Self {
            sample_rate: deps.settings.default_sample_rate,
            id,
            deps,
            state: SessionState::Connecting,
            started_at,
            mode: SessionMode::Live,
            coaching: false,
            client: None,
            subscriptions: HashMap::new(),
            retired_drops: 0,
            signals_tx,
            signals_rx,
            assembler: TranscriptAssembler::new(),
            gates,
            runner,
            task_events,
            tracker: DiscussionTracker::new(),
            tracker_checkpoint: Checkpoint::default(),
            tracker_epoch: 0,
            tracker_run: None,
            profile: AccumulatedProfile::new(),
            memory: EngineMemory::default(),
            suggestion: None,
            summary_task: None,
            simulation_turn: 0,
            outbound,
            outbound_open: true,
            stats_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Live view of this session's statistics
    pub fn stats(&self) -> watch::Receiver<SessionStats> {
        self.stats_tx.subscribe()
    }

    /// Drive the session until it closes; returns the final statistics.
    ///
    /// Inbound messages are handled in arrival order. The loop ends when the
    /// transport closes, or after the summary result once one was requested.
    pub async fn run<S>(mut self, mut inbound: S) -> SessionStats
    where
        S: Stream<Item = Inbound> + Unpin,
    {
        info!("Session {} started", self.id);
        let mut transport_open = true;

        while self.state != SessionState::Closed {
            tokio::select! {
                message = inbound.next(), if transport_open => match message {
                    Some(Inbound::Binary(frame)) => {
                        self.handle_audio(&frame);
                        continue;
                    }
                    Some(Inbound::Text(text)) => self.handle_text(&text).await,
                    Some(Inbound::Close) | None => {
                        transport_open = false;
                        self.on_transport_lost();
                    }
                },
                Some(signal) = self.signals_rx.recv() => self.handle_signal(signal).await,
                Some(event) = self.task_events.recv() => self.handle_task_event(event).await,
                else => self.state = SessionState::Closed,
            }
            self.publish_stats();
        }

        self.shutdown();
        self.publish_stats();

        let stats = self.stats_tx.borrow().clone();
        info!(
            "Session {} closed after {:.1}s ({} lines, {} chars)",
            self.id, stats.duration_secs, stats.committed_lines, stats.transcript_chars
        );
        stats
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    fn handle_audio(&mut self, frame: &[u8]) {
        if self.state != SessionState::Active {
            debug!("Session {} not accepting audio, dropping frame", self.id);
            return;
        }

        let packet = match AudioPacket::decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Dropping audio frame: {}", e);
                return;
            }
        };

        let Some(subscription) = self.subscriptions.get_mut(&packet.source) else {
            debug!("No transcription for {}, dropping frame", packet.source);
            return;
        };
        if !subscription.send(packet.pcm.to_vec()) {
            debug!("Transcription for {} no longer accepts audio", packet.source);
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed control message: {}", e);
                return;
            }
        };

        if self.state == SessionState::Summarizing && !matches!(message, ClientMessage::Ping) {
            debug!("Summary in progress, ignoring {:?}", message);
            return;
        }

        match message {
            ClientMessage::Config {
                sample_rate,
                sources,
                mode,
            } => self.configure(sample_rate, &sources, mode).await,
            ClientMessage::Ping => self.emit(ServerEvent::Pong).await,
            ClientMessage::ClientContext {
                client_id,
                discussion_points,
            } => self.set_client_context(&client_id, &discussion_points).await,
            ClientMessage::SetDiscussionPoints { discussion_points } => {
                self.replace_points(&discussion_points, PointOrigin::Manual);
                self.emit_tracker_update().await;
            }
            ClientMessage::RequestDiscussionSuggestions => {
                self.start_task(TaskKind::DiscussionSuggestions);
            }
            ClientMessage::CoachingMode { enabled } => {
                info!("Session {} coaching mode: {}", self.id, enabled);
                self.coaching = enabled;
            }
            ClientMessage::GenerateSummary => self.request_summary().await,
        }
    }

    async fn configure(&mut self, sample_rate: Option<u32>, sources: &[String], mode: SessionMode) {
        if self.state != SessionState::Connecting {
            warn!("Session {} already configured, ignoring config", self.id);
            return;
        }

        self.sample_rate = sample_rate
            .filter(|&rate| rate > 0)
            .unwrap_or(self.deps.settings.default_sample_rate);
        self.mode = mode;

        let wanted = match mode {
            SessionMode::Simulation => vec![AudioSource::Room],
            SessionMode::Live => {
                let mut wanted = Vec::new();
                for name in sources {
                    match AudioSource::from_config_name(name) {
                        Some(source) if !wanted.contains(&source) => wanted.push(source),
                        Some(_) => {}
                        None => warn!("Ignoring unknown audio source in config: {}", name),
                    }
                }
                wanted
            }
        };

        self.state = SessionState::Active;
        info!(
            "Session {} configured: {:?} mode, {} Hz, sources {:?}",
            self.id, mode, self.sample_rate, wanted
        );

        for source in wanted {
            let request = SttRequest {
                session_id: self.id.clone(),
                source,
                sample_rate: self.sample_rate,
                queue_depth: self.deps.settings.audio_queue_depth.max(1),
            };
            let label = self.source_label(source);

            match TranscriptionSubscription::open(
                self.deps.stt.as_ref(),
                request,
                self.signals_tx.clone(),
            )
            .await
            {
                Ok(subscription) => {
                    self.subscriptions.insert(source, subscription);
                    self.emit(ServerEvent::status(format!("{} transcription connected", label)))
                        .await;
                }
                Err(e) => {
                    warn!("Session {}: {:#}", self.id, e);
                    self.emit(ServerEvent::status(format!("{} transcription unavailable", label)))
                        .await;
                }
            }
        }
    }

    async fn set_client_context(&mut self, client_id: &str, points: &[String]) {
        match self.deps.clients.get(client_id) {
            Some(record) => {
                info!("Session {} client context: {} ({})", self.id, record.name, record.id);
                self.client = Some(record.clone());
            }
            None => warn!("Unknown client {}, ignoring context", client_id),
        }

        if !points.is_empty() {
            self.replace_points(points, PointOrigin::Seeded);
            self.emit_tracker_update().await;
        }
    }

    async fn request_summary(&mut self) {
        if self.summary_task.is_some() {
            return;
        }
        if self.assembler.is_empty() {
            self.emit(ServerEvent::summary_failed("No transcript to summarize"))
                .await;
            return;
        }

        self.state = SessionState::Summarizing;
        self.close_subscriptions();

        info!(
            "Session {} summarizing {} lines",
            self.id,
            self.assembler.buffer().len()
        );
        self.emit(ServerEvent::status("Generating post-call summary"))
            .await;

        match self.start_task(TaskKind::Summary) {
            Some(id) => self.summary_task = Some(id),
            None => {
                let event = ServerEvent::summary_failed("Summary already in progress");
                self.deliver_summary(event).await;
            }
        }
    }

    fn on_transport_lost(&mut self) {
        self.outbound_open = false;
        if self.state == SessionState::Summarizing {
            warn!(
                "Session {} lost its client during summary; result will go to notes only",
                self.id
            );
        } else {
            info!("Session {} client disconnected", self.id);
            self.state = SessionState::Closed;
        }
    }

    // ------------------------------------------------------------------
    // Transcription
    // ------------------------------------------------------------------

    async fn handle_signal(&mut self, signal: SourceSignal) {
        if self.state != SessionState::Active {
            return;
        }

        match signal {
            SourceSignal::Transcript(source, event) => self.handle_transcript(source, event).await,
            SourceSignal::Ended(source) => {
                let Some(subscription) = self.subscriptions.remove(&source) else {
                    return;
                };
                self.retired_drops += subscription.frames_dropped();
                warn!(
                    "Session {} lost {} transcription, continuing with {} source(s)",
                    self.id,
                    source,
                    self.subscriptions.len()
                );
                self.assembler.clear_partial(source);
                let label = self.source_label(source);
                self.emit(ServerEvent::status(format!("{} transcription disconnected", label)))
                    .await;
            }
        }
    }

    async fn handle_transcript(&mut self, source: AudioSource, stt: SttEvent) {
        let speaker = self.speaker_for(source);
        let is_final = stt.is_final;
        let event = if is_final {
            TranscriptEvent::final_text(speaker, stt.text)
        } else {
            TranscriptEvent::partial(speaker, stt.text)
        };
        let wire = ServerEvent::Transcript {
            text: event.text.trim().to_string(),
            is_final,
            speaker: speaker.to_string(),
        };

        match self.assembler.observe(source, event) {
            Observation::Partial => self.emit(wire).await,
            Observation::Discarded => {}
            Observation::Committed(checkpoint) => {
                debug!("Committed line {} from {}", checkpoint.lines, source);
                if self.mode == SessionMode::Simulation {
                    self.simulation_turn += 1;
                }
                self.emit(wire).await;
                self.evaluate_gates();
            }
        }
    }

    fn speaker_for(&self, source: AudioSource) -> &'static str {
        match self.mode {
            SessionMode::Simulation => SIMULATION_SPEAKERS[self.simulation_turn % 2],
            SessionMode::Live => source.speaker_label(),
        }
    }

    fn source_label(&self, source: AudioSource) -> &'static str {
        match self.mode {
            SessionMode::Simulation => "Call",
            SessionMode::Live => source.speaker_label(),
        }
    }

    // ------------------------------------------------------------------
    // Gating and task contexts
    // ------------------------------------------------------------------

    fn evaluate_gates(&mut self) {
        let total = self.assembler.total_chars();
        let runner = &self.runner;
        let fired = self
            .gates
            .evaluate(total, self.tracker.is_active(), |kind| runner.is_busy(kind));

        for kind in fired {
            self.start_task(kind);
        }
    }

    fn start_task(&mut self, kind: TaskKind) -> Option<TaskId> {
        if self.runner.is_busy(kind) {
            debug!("Session {}: {} already running", self.id, kind);
            return None;
        }

        let context = self.build_context(kind);
        let id = self.runner.start(kind, context)?;
        if kind == TaskKind::DiscussionTracker {
            self.tracker_run = Some(TrackerRun {
                id,
                epoch: self.tracker_epoch,
                checkpoint: self.assembler.checkpoint(),
            });
        }
        Some(id)
    }

    fn build_context(&self, kind: TaskKind) -> Value {
        let transcript = self.assembler.snapshot();
        let client_context = self.client.as_ref().map(ClientRecord::context_prompt);

        match kind {
            TaskKind::Suggestion => json!({
                "transcript": transcript,
                "client_context": client_context,
                "coaching_mode": self.coaching,
                "prior_suggestions": self.memory.suggestions,
            }),
            TaskKind::Compliance => json!({
                "transcript": transcript,
                "client_context": client_context,
                "prior_issues": self.memory.compliance_issues,
            }),
            TaskKind::Todo => json!({
                "transcript": transcript,
                "known_todos": self.memory.todos,
            }),
            TaskKind::DiscussionTracker => json!({
                "transcript_slice": self.assembler.new_since(self.tracker_checkpoint),
                "points": self.tracker.points(),
                "client_context": client_context,
            }),
            TaskKind::Summary => json!({
                "transcript": transcript,
                "client_context": client_context,
                "client_name": self.client.as_ref().map(|c| c.name.as_str()),
                "profile": self.profile.to_json(),
                "discussion_points": self.tracker.points(),
                "compliance_issues": self.memory.compliance_issues,
                "todos": self.memory.todos,
            }),
            TaskKind::Intelligence | TaskKind::WordCloud | TaskKind::DiscussionSuggestions => {
                json!({
                    "transcript": transcript,
                    "client_context": client_context,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Task results
    // ------------------------------------------------------------------

    async fn handle_task_event(&mut self, event: TaskEvent) {
        let TaskEvent { id, update } = event;

        match update {
            TaskUpdate::Started => {
                if id.kind == TaskKind::Suggestion {
                    self.suggestion = Some(SuggestionStream::new(id));
                    self.emit(ServerEvent::SuggestionStart { id: id.to_string() })
                        .await;
                }
            }
            TaskUpdate::Chunk(text) => {
                let visible = self
                    .suggestion
                    .as_mut()
                    .filter(|stream| stream.id == id)
                    .and_then(|stream| stream.push(&text));
                if let Some(text) = visible {
                    self.emit(ServerEvent::SuggestionChunk {
                        id: id.to_string(),
                        text,
                    })
                    .await;
                }
            }
            TaskUpdate::Done(outcome) => self.finish_task(id, outcome).await,
        }
    }

    async fn finish_task(&mut self, id: TaskId, outcome: TaskOutcome) {
        match id.kind {
            TaskKind::Suggestion => return self.finish_suggestion(id, &outcome).await,
            TaskKind::Summary => return self.finish_summary(id, outcome).await,
            TaskKind::DiscussionTracker => return self.finish_tracker(id, &outcome).await,
            _ => {}
        }

        let Some(text) = outcome.text() else {
            if let TaskOutcome::Failed(e) = &outcome {
                debug!("Task {} produced no result: {}", id, e);
                if id.kind == TaskKind::DiscussionSuggestions {
                    self.emit(ServerEvent::Error {
                        message: format!("Discussion suggestions failed: {}", e),
                    })
                    .await;
                }
            }
            return;
        };

        match id.kind {
            TaskKind::Intelligence => self.apply_intelligence(text).await,
            TaskKind::WordCloud => self.apply_word_cloud(text).await,
            TaskKind::Compliance => self.apply_compliance(text).await,
            TaskKind::Todo => self.apply_todos(text).await,
            TaskKind::DiscussionSuggestions => self.apply_discussion_suggestions(text).await,
            TaskKind::Suggestion | TaskKind::Summary | TaskKind::DiscussionTracker => {}
        }
    }

    async fn finish_suggestion(&mut self, id: TaskId, outcome: &TaskOutcome) {
        let mut stream = self.suggestion.take().filter(|stream| stream.id == id);
        let text = outcome.text().filter(|text| !is_no_suggestion(text));

        if let Some(text) = text {
            if let Some(rest) = stream.as_mut().and_then(|stream| stream.finish(text)) {
                self.emit(ServerEvent::SuggestionChunk {
                    id: id.to_string(),
                    text: rest,
                })
                .await;
            }

            self.memory.suggestions.push_back(text.trim().to_string());
            while self.memory.suggestions.len() > SUGGESTION_MEMORY {
                self.memory.suggestions.pop_front();
            }
        }

        self.emit(ServerEvent::SuggestionDone {
            id: id.to_string(),
            had_suggestion: text.is_some(),
        })
        .await;
    }

    async fn apply_intelligence(&mut self, text: &str) {
        let Some(report) = parse_json_response::<IntelligenceReport>(text) else {
            warn!("Session {}: unparseable intelligence response", self.id);
            return;
        };
        if !report.has_content() {
            debug!("Intelligence update carried nothing new");
            return;
        }

        self.profile.absorb(&report);
        self.emit(ServerEvent::IntelligenceUpdate(report)).await;
    }

    async fn apply_word_cloud(&mut self, text: &str) {
        let Some(cloud) = parse_json_response::<WordCloud>(text) else {
            warn!("Session {}: unparseable word cloud response", self.id);
            return;
        };
        if cloud.topics.is_empty() {
            return;
        }

        self.emit(ServerEvent::WordCloudUpdate {
            topics: cloud.topics,
        })
        .await;
    }

    async fn apply_compliance(&mut self, text: &str) {
        let Some(scan) = parse_json_response::<ComplianceScan>(text) else {
            warn!("Session {}: unparseable compliance response", self.id);
            return;
        };

        let mut critical = false;
        for flag in scan.flags {
            let key = dedup_key(&flag.issue);
            if key.is_empty() || !self.memory.compliance_keys.insert(key) {
                continue;
            }

            warn!(
                "Session {} compliance alert ({:?}): {}",
                self.id, flag.severity, flag.issue
            );
            self.memory.compliance_issues.push(flag.issue.trim().to_string());
            critical |= flag.severity == Severity::Critical;
            self.emit(ServerEvent::ComplianceAlert(flag)).await;
        }

        if critical {
            self.gates.escalate_compliance();
        }
    }

    async fn apply_todos(&mut self, text: &str) {
        let Some(list) = parse_json_response::<TodoList>(text) else {
            warn!("Session {}: unparseable todo response", self.id);
            return;
        };

        let mut fresh = Vec::new();
        for item in list.items {
            let item = item.trim();
            let key = dedup_key(item);
            if key.is_empty() || !self.memory.todo_keys.insert(key) {
                continue;
            }
            self.memory.todos.push(item.to_string());
            fresh.push(item.to_string());
        }

        if !fresh.is_empty() {
            self.emit(ServerEvent::TodoUpdate { items: fresh }).await;
        }
    }

    /// Apply a tracker result. The transcript slice it covered only counts as
    /// evaluated once an assessment for the current point list is applied;
    /// otherwise the next run sees that slice again.
    async fn finish_tracker(&mut self, id: TaskId, outcome: &TaskOutcome) {
        let Some(run) = self.tracker_run.filter(|run| run.id == id) else {
            return;
        };
        self.tracker_run = None;
        if run.epoch != self.tracker_epoch {
            debug!("Discarding tracker result {} for a replaced point list", id);
            return;
        }

        let Some(text) = outcome.text() else {
            debug!("Tracker run {} produced no result, slice will be retried", id);
            return;
        };
        let Some(assessment) = parse_json_response::<TrackerAssessment>(text) else {
            warn!("Session {}: unparseable tracker response", self.id);
            return;
        };

        self.tracker_checkpoint = run.checkpoint;
        if !self.tracker.is_active() {
            return;
        }

        let change = self.tracker.apply(&assessment);
        if change.is_visible() {
            self.emit_tracker_update().await;
        }
    }

    async fn apply_discussion_suggestions(&mut self, text: &str) {
        let Some(list) = parse_json_response::<PointList>(text) else {
            warn!("Session {}: unparseable discussion suggestions", self.id);
            return;
        };

        self.replace_points(&list.points, PointOrigin::AutoSuggested);
        if !self.tracker.is_active() {
            return;
        }

        let points = self
            .tracker
            .points()
            .iter()
            .map(|p| p.text.clone())
            .collect();
        self.emit(ServerEvent::DiscussionSuggestions { points }).await;
        self.emit_tracker_update().await;
    }

    fn replace_points(&mut self, points: &[String], origin: PointOrigin) {
        self.tracker.set_points(points, origin);
        self.tracker_epoch += 1;
        // New points are judged against the whole call so far
        self.tracker_checkpoint = Checkpoint::default();
    }

    async fn emit_tracker_update(&mut self) {
        let event = ServerEvent::DiscussionTrackerUpdate {
            points: self.tracker.points().to_vec(),
            nudge: self.tracker.nudge().to_string(),
        };
        self.emit(event).await;
    }

    // ------------------------------------------------------------------
    // Summary
    // ------------------------------------------------------------------

    async fn finish_summary(&mut self, id: TaskId, outcome: TaskOutcome) {
        if self.summary_task != Some(id) {
            return;
        }
        self.summary_task = None;

        let event = match outcome {
            TaskOutcome::Completed(text) => match summary_report(&text) {
                Some(report) => ServerEvent::PostCallSummary {
                    report: Some(Box::new(report)),
                    error: None,
                },
                None => ServerEvent::summary_failed("Summary generation returned no content"),
            },
            TaskOutcome::Failed(e) => {
                warn!("Session {} summary failed: {}", self.id, e);
                ServerEvent::summary_failed(e.to_string())
            }
        };

        self.deliver_summary(event).await;
    }

    /// Send the terminal summary event, store it in notes, and close
    async fn deliver_summary(&mut self, event: ServerEvent) {
        self.emit(event.clone()).await;
        self.persist_summary(&event).await;
        self.state = SessionState::Closed;
    }

    async fn persist_summary(&self, event: &ServerEvent) {
        let body = match event.to_json() {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to serialize summary: {}", e);
                return;
            }
        };

        let mut keys = vec![format!("summary-{}", self.id)];
        if let Some(client) = &self.client {
            keys.push(format!("summary-{}", client.id));
        }

        for key in keys {
            match self.deps.notes.put(&key, &body).await {
                Ok(()) => info!("Stored post-call summary as {}", key),
                Err(e) => warn!("Failed to store summary as {}: {}", key, e),
            }
        }
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn emit(&mut self, event: ServerEvent) {
        if !self.outbound_open {
            debug!("Client gone, dropping {} event", event.kind());
            return;
        }
        if self.outbound.send(event).await.is_err() {
            debug!("Session {} outbound channel closed", self.id);
            self.outbound_open = false;
        }
    }

    fn publish_stats(&self) {
        let now = Utc::now();
        self.stats_tx.send_modify(|stats| {
            stats.state = self.state;
            stats.mode = self.mode;
            stats.sources = self.subscriptions.keys().copied().collect();
            stats.sources.sort();
            stats.client_id = self.client.as_ref().map(|c| c.id.clone());
            stats.duration_secs =
                (now - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;
            stats.committed_lines = self.assembler.buffer().len();
            stats.transcript_chars = self.assembler.total_chars();
            stats.active_tasks = self.runner.active_count();
            stats.dropped_frames = self.retired_drops
                + self
                    .subscriptions
                    .values()
                    .map(TranscriptionSubscription::frames_dropped)
                    .sum::<u64>();
        });
    }

    fn close_subscriptions(&mut self) {
        for (_, mut subscription) in self.subscriptions.drain() {
            subscription.close();
            self.retired_drops += subscription.frames_dropped();
        }
    }

    fn shutdown(&mut self) {
        self.close_subscriptions();
        self.runner.abandon_all();
        self.state = SessionState::Closed;
    }
}

/// Structured report from a summary reply; plain prose becomes the narrative
fn summary_report(text: &str) -> Option<PostCallReport> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    match parse_json_response::<PostCallReport>(text) {
        Some(report) if !report.is_empty() => Some(report),
        _ => Some(PostCallReport {
            summary: text.to_string(),
            ..Default::default()
        }),
    }
}
