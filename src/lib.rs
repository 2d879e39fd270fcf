pub mod config;
pub mod crm;
pub mod gate;
pub mod generation;
pub mod http;
pub mod nats;
pub mod protocol;
pub mod session;
pub mod stt;
pub mod tracker;
pub mod transcript;

pub use config::Config;
pub use crm::{ClientDirectory, FileNotesStore, MemoryNotesStore, NotesStore};
pub use gate::{Clock, GatingEngine, ManualClock, SystemClock};
pub use generation::{GenerationBackend, TaskRunner};
pub use http::{create_router, AppState};
pub use nats::NatsClient;
pub use protocol::{AudioSource, ClientMessage, ServerEvent};
pub use session::{AdvisorSession, Inbound, SessionDeps, SessionSettings, SessionStats};
pub use stt::SpeechToText;
pub use transcript::TranscriptAssembler;
