//! HTTP and WebSocket API
//!
//! This module provides:
//! - GET /ws/audio - Live session protocol (audio in, events out)
//! - GET /sessions, GET /sessions/:id/status - Session queries
//! - GET /api/clients, GET /api/clients/:id - Client directory lookup
//! - POST /api/suggest-discussion-points - Pre-call discussion points
//! - GET/PUT /api/notes/:key - Advisor notes
//! - GET /health - Health check

mod handlers;
mod routes;
mod socket;
mod state;

pub use handlers::{HealthResponse, NoteBody, NoteResponse, SuggestPointsResponse};
pub use routes::create_router;
pub use state::{AppState, SessionRegistry};
