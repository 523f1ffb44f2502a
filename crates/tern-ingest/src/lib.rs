//! Converts an opaque browser event stream into base facts pushed to a
//! [`tern_facts::FactStore`].
//!
//! [`EventIngestor`] owns per-session `dom_updated` throttling (burst
//! coalescing that never drops the first or last event of a burst) and a
//! small bounded buffer so a momentarily contended fact store never blocks
//! the event source — see [`IngestConfig`] and [`EventIngestor::run`].

mod error;
mod event;
mod ingestor;

pub use error::IngestError;
pub use event::BrowserEvent;
pub use ingestor::{EventIngestor, IngestConfig};
