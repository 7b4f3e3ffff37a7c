//! Backend error types.

use std::path::PathBuf;

use occubench_config::BackendKind;
use occubench_core::BenchError;
use thiserror::Error;

pub type TargetResult<T> = Result<T, TargetError>;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("lock poisoned")]
    LockPoisoned,

    #[error("{0} is already closed")]
    Closed(PathBuf),

    #[error("the {backend:?} backend does not support {operation}")]
    Unsupported {
        backend: BackendKind,
        operation: &'static str,
    },

    #[error("the csv backend needs output.csv_dir")]
    MissingCsvDir,
}

impl TargetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TargetError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<TargetError> for BenchError {
    fn from(e: TargetError) -> Self {
        BenchError::Backend(e.to_string())
    }
}
