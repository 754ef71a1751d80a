use std::path::PathBuf;

use thiserror::Error;

use crate::oracle::Role;

/// Conditions that stop the harness itself.
///
/// Disagreements between the two engines and protocol faults on a single
/// query are not errors; they are reported through
/// [`FailureReason`](crate::hunt::FailureReason).
#[derive(Debug, Error)]
pub enum HuntError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{oracle} engine closed its input")]
    OracleClosed { oracle: Role },

    #[error("{oracle} engine handshake failed: {reason}")]
    Handshake { oracle: Role, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("perft depth must be at least 1, got {0}")]
    InvalidDepth(u32),

    #[error("{}:{line}: {reason}", path.display())]
    BatchFile {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}
