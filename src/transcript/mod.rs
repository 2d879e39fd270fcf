//! Speaker-labeled transcript assembly
//!
//! Partial events are provisional and replaced per source; final events are
//! committed in arrival order and never change afterwards.

mod assembler;

pub use assembler::{
    Checkpoint, Observation, TranscriptAssembler, TranscriptBuffer, TranscriptEvent,
    TranscriptLine,
};
