//! Client data and advisor notes
//!
//! - `ClientDirectory`: read-only client/portfolio lookup used to seed context
//!   and discussion points
//! - `NotesStore`: key → text blob store for advisor notes and call summaries

mod clients;
mod notes;

pub use clients::{
    format_usd, Account, ClientDirectory, ClientRecord, ClientSummary, Goal, PastConversation,
    Personal,
};
pub use notes::{FileNotesStore, MemoryNotesStore, NotesError, NotesStore};
