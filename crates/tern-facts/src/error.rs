//! Error types for the fact store.

use thiserror::Error;

/// Errors that can occur in fact store operations.
///
/// The fact store itself never fails a `push`, `by_predicate`, `temporal`, or
/// `all` call (overflow is silent, arity mismatches are logged and dropped) —
/// this type exists so the trait boundary has somewhere to grow without
/// breaking callers, and so crates above us can fold it into a broader error
/// enum via `#[from]`.
#[derive(Debug, Error)]
pub enum FactsError {
    /// A fact was asserted with an arity that does not match the predicate's
    /// previously observed arity. Logged and dropped, never returned from a
    /// public API today, but kept typed for callers who want to assert on it
    /// in tests.
    #[error("arity mismatch for predicate {predicate}: expected {expected}, got {actual}")]
    ArityMismatch {
        predicate: String,
        expected: usize,
        actual: usize,
    },
}
