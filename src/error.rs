use std::path::PathBuf;
use thiserror::Error;

/// Failure classes for a single subject/session conversion.
///
/// Every variant aborts only the conversion it occurred in; the batch driver
/// logs the [`kind`](ConvertError::kind) and moves on to the next subject.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// A field that must hold a fixed value across the whole dataset held
    /// something else. Never coerced or defaulted.
    #[error("invalid value for {field}: expected {expected}, found {observed}")]
    Validation {
        field: String,
        expected: String,
        observed: String,
    },

    /// A sidecar file or container record is missing a required key/column or
    /// holds a malformed value.
    #[error("schema error: {0}")]
    Schema(String),

    /// Records that must agree with each other do not (array-length mismatch,
    /// index out of table range).
    #[error("inconsistent records: {0}")]
    Consistency(String),

    /// A container path that the mapping requires is absent.
    #[error("record not found at {0}")]
    NotFound(String),

    /// A container record exists but holds an unexpected value type.
    #[error("type mismatch at {path}: expected {expected}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConvertError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }

    /// Short stable name for the failure class, used in per-subject reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertError::Validation { .. } => "validation",
            ConvertError::Schema(_)
            | ConvertError::NotFound(_)
            | ConvertError::TypeMismatch { .. } => "schema",
            ConvertError::Consistency(_) => "consistency",
            ConvertError::Io { .. } => "io",
        }
    }
}
