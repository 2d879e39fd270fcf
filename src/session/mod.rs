//! Advisor session management
//!
//! This module provides the `AdvisorSession` abstraction that manages:
//! - The wire protocol (binary audio frames and JSON control messages)
//! - One transcription subscription per configured audio source
//! - Transcript assembly and gate evaluation on every committed line
//! - The reactive engines and their session-scoped memory
//! - The post-call summary and session statistics

mod config;
mod profile;
mod session;
mod stats;
mod subscription;
mod suggestion;

pub use config::SessionSettings;
pub use profile::AccumulatedProfile;
pub use session::{AdvisorSession, Inbound, SessionDeps};
pub use stats::{SessionState, SessionStats};
pub use subscription::{SourceSignal, TranscriptionSubscription};
pub use suggestion::is_no_suggestion;
