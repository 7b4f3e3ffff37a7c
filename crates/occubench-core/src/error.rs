//! Errors surfaced by the workload orchestrators.

use occubench_config::ConfigError;
use occubench_gen::GenError;
use occubench_types::QueryKind;
use thiserror::Error;

/// Result type for orchestration and backend calls.
pub type BenchResult<T> = Result<T, BenchError>;

#[derive(Debug, Error)]
pub enum BenchError {
    /// Transport or storage failure reported by a backend.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gen(#[from] GenError),

    /// A worker thread panicked instead of returning.
    #[error("thread {0} panicked")]
    ThreadPanicked(String),

    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },

    /// The backend does not answer this query type.
    #[error("query {0} is not supported by this backend")]
    Unsupported(QueryKind),
}

impl BenchError {
    pub fn backend(message: impl Into<String>) -> Self {
        BenchError::Backend(message.into())
    }
}
