//! Error type for the event ingestion pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("subscription lost for session {session_id} category {category}")]
    SubscriptionLost { session_id: String, category: String },

    #[error("malformed event: {0}")]
    MalformedEvent(String),
}
