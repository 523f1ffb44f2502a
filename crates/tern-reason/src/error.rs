//! Error types for the reasoning engine.

use thiserror::Error;

/// Errors that can occur in reasoning engine operations.
#[derive(Debug, Error)]
pub enum ReasonError {
    /// A rule or goal failed to parse. Carries a 1-based line/column into
    /// the source text that was handed to `add_rule`/`query`.
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        message: String,
        line: usize,
        column: usize,
    },

    /// Something the engine itself should never hit — a bug, not a bad
    /// program. Kept distinct from `Parse` so callers can tell "your rule
    /// text is wrong" from "we broke".
    #[error("internal reasoning error: {0}")]
    Internal(String),
}

impl ReasonError {
    pub fn parse(message: impl Into<String>) -> Self {
        ReasonError::Parse {
            message: message.into(),
            line: 1,
            column: 1,
        }
    }
}
