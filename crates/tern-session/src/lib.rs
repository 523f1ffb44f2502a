//! Session and element-registry management.
//!
//! A [`Session`] pairs an opaque [`PageController`] with an
//! [`ElementRegistry`] of [`Fingerprint`]s; a [`SessionManager`] owns the
//! read-mostly map from session id to `Session`, mutated only on
//! create/fork/attach/destroy.

mod error;
mod fingerprint;
mod manager;
mod page;
mod registry;
mod session;

pub use error::SessionError;
pub use fingerprint::{BoundingBox, DriftReport, Fingerprint};
pub use manager::SessionManager;
pub use page::{PageController, PageError, PageLauncher};
pub use registry::ElementRegistry;
pub use session::Session;
