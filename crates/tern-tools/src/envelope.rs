//! The response envelope shared by all four progressive tools.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Summary,
    #[default]
    Compact,
    Full,
}

impl View {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "summary" => Some(View::Summary),
            "compact" => Some(View::Compact),
            "full" => Some(View::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NextStep {
    pub tool: String,
    pub args: Value,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub success: bool,
    pub status: Status,
    pub summary: String,
    pub view: View,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub evidence_handles: Vec<String>,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<NextStep>,
}

impl ToolResponse {
    pub fn ok(summary: impl Into<String>, view: View) -> Self {
        Self {
            success: true,
            status: Status::Ok,
            summary: summary.into(),
            view,
            data: None,
            evidence_handles: Vec::new(),
            truncated: false,
            next_step: None,
        }
    }

    pub fn warning(summary: impl Into<String>, view: View) -> Self {
        Self {
            success: true,
            status: Status::Warning,
            summary: summary.into(),
            view,
            data: None,
            evidence_handles: Vec::new(),
            truncated: false,
            next_step: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_evidence(mut self, handles: Vec<String>) -> Self {
        self.evidence_handles = handles;
        self
    }

    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    pub fn with_next_step(mut self, next_step: NextStep) -> Self {
        self.next_step = Some(next_step);
        self
    }
}

/// Builds an opaque evidence-handle string like `reason:<sid>:failed_requests`.
pub fn evidence_handle(tool: &str, session_id: &str, key: &str) -> String {
    format!("{tool}:{session_id}:{key}")
}

/// Caps a vector to `limit` entries, reporting whether it truncated.
pub fn truncate_vec<T>(items: Vec<T>, limit: usize) -> (Vec<T>, bool) {
    if items.len() > limit {
        let truncated = items.into_iter().take(limit).collect();
        (truncated, true)
    } else {
        (items, false)
    }
}
