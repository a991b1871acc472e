use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid model profile, budget or settings. Fatal for the run.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The model's reply could not be decomposed into the three summary parts,
    /// even after the reformat retry.
    #[error("Chunk {chunk_index}: unparseable response: {reason}")]
    ResponseFormat { chunk_index: usize, reason: String },

    /// Timeouts, rate limits and 5xx responses that outlasted the retry budget.
    #[error("Chunk {chunk_index}: service unavailable after {attempts} attempts: {source}")]
    TransientService {
        chunk_index: usize,
        attempts: u32,
        #[source]
        source: crate::provider::Error,
    },

    /// Non-retryable provider failure (bad request, authentication).
    #[error("Chunk {chunk_index}: completion failed: {source}")]
    Service {
        chunk_index: usize,
        #[source]
        source: crate::provider::Error,
    },

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Partial summaries out of order: expected chunk {expected}, found {found}")]
    PartialOrder { expected: usize, found: usize },

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("HTML error: {0}")]
    Html(String),
}

impl Error {
    /// Chunk the failure is attributed to, if any.
    #[must_use]
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Self::ResponseFormat { chunk_index, .. }
            | Self::TransientService { chunk_index, .. }
            | Self::Service { chunk_index, .. } => Some(*chunk_index),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
