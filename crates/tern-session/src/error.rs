//! Error type for session and element-registry operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("stale ref {ref_id}: expected generation {expected_generation}, found {actual_generation}")]
    StaleRef {
        ref_id: String,
        expected_generation: u64,
        actual_generation: u64,
    },
}
