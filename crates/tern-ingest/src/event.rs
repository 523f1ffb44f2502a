//! The opaque, CDP-like event model handed to [`crate::ingestor::EventIngestor`].
//!
//! These variants are deliberately not a faithful CDP protocol mirror —
//! implementing CDP is an explicit non-goal. They're the minimal shape a
//! browser driver needs to report so each one converts to exactly one base
//! fact, per the Event Ingestor's "at most one fact per handler" invariant.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrowserEvent {
    RequestIssued {
        request_id: String,
        method: String,
        url: String,
        initiator: String,
        t: i64,
    },
    ResponseReceived {
        request_id: String,
        status: i64,
        latency_ms: i64,
        duration_ms: i64,
        /// Event-time in epoch ms — not one of `net_response`'s declared
        /// args, but still the fact's own timestamp metadata, which is
        /// what the reasoning engine's temporal-proximity natives key on.
        t: i64,
    },
    ConsoleMessage {
        level: String,
        message: String,
        t: i64,
    },
    NavigationCommitted {
        url: String,
        t: i64,
    },
    DomMutationBatch {
        t: i64,
    },
    ToastObserved {
        text: String,
        level: String,
        source: String,
        t: i64,
    },
    DockerLogLine {
        container: String,
        level: String,
        tag: String,
        message: String,
        t: i64,
    },
    DockerLogCorrelation {
        container: String,
        key_type: String,
        key_value: String,
        message: String,
        t: i64,
    },
}

impl BrowserEvent {
    /// The predicate this event converts to, used for per-predicate
    /// throttling and logging before the fact itself is built.
    pub fn predicate(&self) -> &'static str {
        match self {
            BrowserEvent::RequestIssued { .. } => "net_request",
            BrowserEvent::ResponseReceived { .. } => "net_response",
            BrowserEvent::ConsoleMessage { .. } => "console_event",
            BrowserEvent::NavigationCommitted { .. } => "navigation_event",
            BrowserEvent::DomMutationBatch { .. } => "dom_updated",
            BrowserEvent::ToastObserved { .. } => "toast_notification",
            BrowserEvent::DockerLogLine { .. } => "docker_log",
            BrowserEvent::DockerLogCorrelation { .. } => "docker_log_correlation",
        }
    }

    pub fn is_docker(&self) -> bool {
        matches!(
            self,
            BrowserEvent::DockerLogLine { .. } | BrowserEvent::DockerLogCorrelation { .. }
        )
    }
}
