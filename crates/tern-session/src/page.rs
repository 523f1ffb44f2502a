//! The page controller seam: the one place this crate names the browser
//! driver it sits on top of, treated as an opaque external collaborator
//! (implementing CDP is explicitly out of scope for this repository).
//! `tern-ingest` and `tern-tools` depend on this trait rather
//! than on any concrete driver, so neither of them has to know whether
//! "the browser" is a real CDP socket, a test double, or something else
//! entirely.

use async_trait::async_trait;
use serde_json::Value;

/// Minimal contract a browser driver must satisfy for a [`crate::Session`]
/// to drive it. Mirrors only what the Event Ingestor and the four
/// progressive tools actually call — not a general CDP client.
#[async_trait]
pub trait PageController: Send + Sync {
    /// Opaque identifier for the underlying browser target (tab/page).
    fn target_id(&self) -> &str;

    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    /// Evaluates `script` in the page's main world and returns its result.
    async fn evaluate(&self, script: &str) -> Result<Value, PageError>;

    /// Clones this controller's session (cookies, storage) onto a new
    /// target, for `session_fork`.
    async fn fork(&self) -> Result<Box<dyn PageController>, PageError>;

    async fn close(&self) -> Result<(), PageError>;

    /// Captures the current viewport as PNG bytes, for `observe`'s
    /// `screenshot` mode.
    async fn screenshot(&self) -> Result<Vec<u8>, PageError>;
}

/// Opens new browser targets. The counterpart to [`PageController`] for the
/// `session_create`/`session_attach` operations of `act`, which need to
/// construct a controller rather than drive an existing one.
#[async_trait]
pub trait PageLauncher: Send + Sync {
    /// Opens a fresh target (e.g. a blank tab) and returns a controller for
    /// it.
    async fn launch(&self) -> Result<Box<dyn PageController>, PageError>;

    /// Attaches to an already-open target identified by `target_id`, as
    /// opposed to opening a new one.
    async fn attach(&self, target_id: &str) -> Result<Box<dyn PageController>, PageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("page controller transport error: {0}")]
    Transport(String),
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
}
