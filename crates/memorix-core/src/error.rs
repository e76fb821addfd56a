use std::path::PathBuf;

use thiserror::Error;

/// The closed error taxonomy surfaced across the engine's public operations.
///
/// Every variant is a distinct `kind` the façade can forward to a tool-invocation
/// caller without translation (see SPEC_FULL.md's "Error handling" section).
#[derive(Debug, Error)]
pub enum MemorixError {
    #[error("project detection refused: {path} resolves to a home or system directory")]
    InvalidProject { path: PathBuf },

    #[error("lock acquisition on {path} timed out after {attempts} attempts")]
    LockTimeout { path: PathBuf, attempts: u32 },

    #[error("{file} is corrupt and could not be parsed: {source}")]
    IntegrityError {
        file: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("vector search requested but no embedding provider is active")]
    EmbeddingUnavailable,

    #[error("embedding provider {provider} returned {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        provider: String,
        expected: usize,
        actual: usize,
    },

    #[error("io error during {operation} on {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Search(#[from] tantivy::TantivyError),

    #[error(transparent)]
    QueryParse(#[from] tantivy::query::QueryParserError),
}

pub type MemorixResult<T> = Result<T, MemorixError>;

impl MemorixError {
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub fn integrity(file: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::IntegrityError {
            file: file.into(),
            source,
        }
    }
}
