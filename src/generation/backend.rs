use super::task::TaskKind;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The backend reported a structured failure
    #[error("backend error: {0}")]
    Backend(String),

    /// The request could not reach the backend or the stream broke
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with something we could not decode
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("timeout")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}

/// One request to the generation backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub kind: TaskKind,

    /// Kind-specific context (transcript, flags, prior results)
    pub context: serde_json::Value,
}

impl GenerationRequest {
    pub fn new(kind: TaskKind, context: serde_json::Value) -> Self {
        Self { kind, context }
    }
}

/// Ordered text fragments; the stream ending is the completion signal
pub type ChunkStream = BoxStream<'static, Result<String, GenerationError>>;

/// Streaming text-generation service
///
/// Implementations:
/// - NATS: request on `llm.generate.<kind>`, chunks on a reply inbox
/// - In-memory fakes for tests
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Start a generation; fails only if the request could not be issued
    async fn generate(&self, request: GenerationRequest) -> Result<ChunkStream, GenerationError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
