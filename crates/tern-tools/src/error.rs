//! Error type for tool invocations, plus the `{success:false, ...}`
//! envelope every handler failure renders to.

use serde_json::{json, Value};
use thiserror::Error;

use tern_reason::ReasonError;
use tern_session::SessionError;

use crate::envelope::{Status, ToolResponse, View};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptErrorKind {
    Timeout,
    Syntax,
    Runtime,
    Async,
    Security,
    Unknown,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("element error: {0}")]
    Element(String),

    #[error("script {kind:?} error: {message}")]
    Script {
        kind: ScriptErrorKind,
        message: String,
    },

    #[error("operation timed out")]
    Timeout,

    #[error("gated: {0}")]
    Gated(String),

    #[error(transparent)]
    Parse(#[from] ReasonError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ToolError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ToolError::Validation(_) => "validation",
            ToolError::Session(_) => "session",
            ToolError::Element(_) => "element",
            ToolError::Script { .. } => "script",
            ToolError::Timeout => "timeout",
            ToolError::Gated(_) => "gated",
            ToolError::Parse(_) => "parse",
            ToolError::Internal(_) => "internal",
        }
    }

    /// Renders the `{success:false, error, error_type}` shape every tool
    /// response falls back to when a handler fails before it can build a
    /// full envelope.
    pub fn to_envelope(&self) -> Value {
        json!({
            "success": false,
            "error": self.to_string(),
            "error_type": self.error_type(),
        })
    }

    /// Folds this error into the shared tool envelope, for handlers that
    /// build a `ToolResponse` directly rather than going through
    /// `dispatch_to_value`'s serialization fallback.
    pub fn into_response(self, view: View) -> ToolResponse {
        ToolResponse {
            success: false,
            status: Status::Error,
            summary: self.to_string(),
            view,
            data: Some(json!({ "error_type": self.error_type() })),
            evidence_handles: Vec::new(),
            truncated: false,
            next_step: None,
        }
    }
}
