//! Generative task plumbing
//!
//! This module provides:
//! - `GenerationBackend`: the streaming request/response seam to the model
//! - `TaskRunner`: at-most-one-in-flight-per-kind execution with guaranteed
//!   terminal events and per-kind time bounds

mod backend;
mod runner;
mod task;

pub use backend::{ChunkStream, GenerationBackend, GenerationError, GenerationRequest};
pub use runner::{TaskEvent, TaskOutcome, TaskRunner, TaskTimeouts, TaskUpdate};
pub use task::{TaskId, TaskKind, TaskState};
