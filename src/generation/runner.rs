use super::backend::{GenerationBackend, GenerationError, GenerationRequest};
use super::task::{TaskId, TaskKind, TaskState};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Terminal result of a task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Stream finished; the full concatenated text
    Completed(String),
    Failed(GenerationError),
}

impl TaskOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            TaskOutcome::Completed(text) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }

    pub fn had_result(&self) -> bool {
        self.text().is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    Started,
    Chunk(String),
    Done(TaskOutcome),
}

/// Progress of one task, delivered in order per task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub id: TaskId,
    pub update: TaskUpdate,
}

/// Upper bounds on how long a task may run before it is reported as timed out
#[derive(Debug, Clone, Copy)]
pub struct TaskTimeouts {
    pub default: Duration,
    pub summary: Duration,
}

impl TaskTimeouts {
    pub fn for_kind(&self, kind: TaskKind) -> Duration {
        match kind {
            TaskKind::Summary => self.summary,
            _ => self.default,
        }
    }
}

impl Default for TaskTimeouts {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(45),
            summary: Duration::from_secs(30),
        }
    }
}

struct ActiveTask {
    id: TaskId,
    state: TaskState,
    abort: Option<AbortHandle>,
}

type ActiveTable = Arc<Mutex<HashMap<TaskKind, ActiveTask>>>;

fn lock(table: &ActiveTable) -> MutexGuard<'_, HashMap<TaskKind, ActiveTask>> {
    table.lock().unwrap_or_else(|e| e.into_inner())
}

/// Runs generative tasks with at most one in flight per kind.
///
/// Every started task produces `Started`, zero or more `Chunk`s and exactly one
/// `Done` on the event channel. A start request for a busy kind is dropped.
pub struct TaskRunner {
    backend: Arc<dyn GenerationBackend>,
    timeouts: TaskTimeouts,
    events: mpsc::UnboundedSender<TaskEvent>,
    active: ActiveTable,
    next_seq: u64,
}

impl TaskRunner {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        timeouts: TaskTimeouts,
    ) -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let runner = Self {
            backend,
            timeouts,
            events,
            active: Arc::new(Mutex::new(HashMap::new())),
            next_seq: 0,
        };
        (runner, events_rx)
    }

    pub fn is_busy(&self, kind: TaskKind) -> bool {
        lock(&self.active).contains_key(&kind)
    }

    pub fn state(&self, kind: TaskKind) -> Option<TaskState> {
        lock(&self.active).get(&kind).map(|t| t.state)
    }

    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }

    /// Start a task, or return `None` if one of this kind is still running
    pub fn start(&mut self, kind: TaskKind, context: serde_json::Value) -> Option<TaskId> {
        let id = {
            let mut active = lock(&self.active);
            if active.contains_key(&kind) {
                debug!("Task {} already in flight, dropping trigger", kind);
                return None;
            }

            self.next_seq += 1;
            let id = TaskId {
                kind,
                seq: self.next_seq,
            };
            active.insert(
                kind,
                ActiveTask {
                    id,
                    state: TaskState::Pending,
                    abort: None,
                },
            );
            id
        };

        let _ = self.events.send(TaskEvent {
            id,
            update: TaskUpdate::Started,
        });

        let completion = Completion {
            id,
            events: self.events.clone(),
            active: Arc::clone(&self.active),
            finished: false,
        };
        let request = GenerationRequest::new(kind, context);
        let limit = self.timeouts.for_kind(kind);
        let handle = tokio::spawn(run_task(Arc::clone(&self.backend), request, limit, completion));

        if let Some(task) = lock(&self.active).get_mut(&kind) {
            if task.id == id {
                task.abort = Some(handle.abort_handle());
            }
        }

        debug!("Started task {} on {}", id, self.backend.name());
        Some(id)
    }

    /// Abandon every in-flight task; their results are discarded
    pub fn abandon_all(&mut self) {
        let drained: Vec<ActiveTask> = lock(&self.active).drain().map(|(_, t)| t).collect();
        for task in drained {
            info!("Abandoning task {}", task.id);
            if let Some(abort) = task.abort {
                abort.abort();
            }
        }
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.abandon_all();
    }
}

/// Sends the single terminal event for a task, even if it is aborted or panics
struct Completion {
    id: TaskId,
    events: mpsc::UnboundedSender<TaskEvent>,
    active: ActiveTable,
    finished: bool,
}

impl Completion {
    fn mark(&self, state: TaskState) {
        if let Some(task) = lock(&self.active).get_mut(&self.id.kind) {
            if task.id == self.id {
                task.state = state;
            }
        }
    }

    fn chunk(&self, text: String) {
        let _ = self.events.send(TaskEvent {
            id: self.id,
            update: TaskUpdate::Chunk(text),
        });
    }

    fn finish(mut self, outcome: TaskOutcome) {
        self.finished = true;
        self.release();
        let _ = self.events.send(TaskEvent {
            id: self.id,
            update: TaskUpdate::Done(outcome),
        });
    }

    fn release(&self) {
        let mut active = lock(&self.active);
        if active.get(&self.id.kind).is_some_and(|t| t.id == self.id) {
            active.remove(&self.id.kind);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.release();
        let _ = self.events.send(TaskEvent {
            id: self.id,
            update: TaskUpdate::Done(TaskOutcome::Failed(GenerationError::Cancelled)),
        });
    }
}

async fn run_task(
    backend: Arc<dyn GenerationBackend>,
    request: GenerationRequest,
    limit: Duration,
    completion: Completion,
) {
    let id = completion.id;

    let work = async {
        let mut stream = backend.generate(request).await?;
        completion.mark(TaskState::Streaming);

        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            text.push_str(&chunk);
            completion.chunk(chunk);
        }
        Ok::<_, GenerationError>(text)
    };

    let outcome = match tokio::time::timeout(limit, work).await {
        Ok(Ok(text)) => TaskOutcome::Completed(text),
        Ok(Err(e)) => {
            warn!("Task {} failed: {}", id, e);
            TaskOutcome::Failed(e)
        }
        Err(_) => {
            warn!("Task {} timed out after {:?}", id, limit);
            TaskOutcome::Failed(GenerationError::Timeout)
        }
    };

    completion.finish(outcome);
}
