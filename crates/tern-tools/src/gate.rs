//! The progressive-disclosure gate guarding raw JS evaluation and the
//! DOM/React snapshot modes of `observe`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use tern_facts::{Atom, FactStore};

use crate::envelope::{NextStep, Status, ToolResponse, View};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    ExplicitUserIntent,
    LowConfidence,
    ContradictionDetected,
    NoMatchingTool,
}

impl GateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateReason::ExplicitUserIntent => "explicit_user_intent",
            GateReason::LowConfidence => "low_confidence",
            GateReason::ContradictionDetected => "contradiction_detected",
            GateReason::NoMatchingTool => "no_matching_tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "explicit_user_intent" => Some(GateReason::ExplicitUserIntent),
            "low_confidence" => Some(GateReason::LowConfidence),
            "contradiction_detected" => Some(GateReason::ContradictionDetected),
            "no_matching_tool" => Some(GateReason::NoMatchingTool),
            _ => None,
        }
    }
}

/// What the caller supplied when attempting a gated operation.
#[derive(Debug, Clone, Default)]
pub struct GateRequest {
    pub gate_reason: Option<GateReason>,
    pub approved_by_handle: Option<String>,
}

/// Denial detail rendered into the tool's `{gated: true, ...}` response.
#[derive(Debug, Clone)]
pub struct GateDenied {
    pub required_reasons: Vec<&'static str>,
    pub recommended_tool: &'static str,
}

impl Default for GateDenied {
    fn default() -> Self {
        Self {
            required_reasons: vec![
                "explicit_user_intent",
                "low_confidence",
                "contradiction_detected",
                "no_matching_tool",
            ],
            recommended_tool: "browser-reason",
        }
    }
}

impl GateDenied {
    /// Renders the `{success: false, gated: true, error,
    /// required_reasons, recommended_tool}` shape into the shared envelope,
    /// packing the gate-specific fields into `data` since `ToolResponse` is
    /// common to all four tools.
    pub fn into_response(self, view: View) -> ToolResponse {
        ToolResponse {
            success: false,
            status: Status::Error,
            summary: "operation requires disclosure: supply gate_reason (and, for \
                explicit_user_intent, approved_by_handle)"
                .to_string(),
            view,
            data: Some(json!({
                "gated": true,
                "error": "gate denied",
                "required_reasons": self.required_reasons,
                "recommended_tool": self.recommended_tool,
            })),
            evidence_handles: Vec::new(),
            truncated: false,
            next_step: Some(NextStep {
                tool: self.recommended_tool.to_string(),
                args: json!({}),
                reason: "open the gate before retrying this operation".to_string(),
            }),
        }
    }
}

/// Checks whether `request` opens the gate for `session_id`, given the
/// current fact store and a TTL (milliseconds) for `js_gate_open` /
/// `disclosure_handle` facts.
pub fn check_gate(
    facts: &FactStore,
    session_id: &str,
    request: &GateRequest,
    ttl_ms: i64,
) -> Result<(), GateDenied> {
    let Some(reason) = request.gate_reason else {
        return Err(GateDenied::default());
    };

    let now = Utc::now().timestamp_millis();

    match reason {
        GateReason::ExplicitUserIntent => {
            let Some(handle) = &request.approved_by_handle else {
                return Err(GateDenied {
                    required_reasons: vec!["explicit_user_intent"],
                    ..GateDenied::default()
                });
            };
            let approved = facts
                .by_predicate_and_key("disclosure_handle", session_id)
                .into_iter()
                .any(|f| {
                    f.args.get(1).and_then(|a| a.as_str()) == Some(handle.as_str())
                        && now - f.timestamp <= ttl_ms
                });
            if approved {
                Ok(())
            } else {
                Err(GateDenied {
                    required_reasons: vec!["explicit_user_intent"],
                    ..GateDenied::default()
                })
            }
        }
        GateReason::LowConfidence | GateReason::ContradictionDetected | GateReason::NoMatchingTool => {
            let open = facts
                .by_predicate_and_key("js_gate_open", session_id)
                .into_iter()
                .any(|f| {
                    f.args.get(1).and_then(|a| a.as_str()) == Some(reason.as_str())
                        && now - f.timestamp <= ttl_ms
                });
            if open {
                Ok(())
            } else {
                Err(GateDenied::default())
            }
        }
    }
}

/// Pushes a `js_gate_open(S, Reason, T)` fact, as `reason` does when its
/// confidence drops below threshold, contradictions are found, or it
/// produces no recommendations.
pub fn open_gate(facts: &FactStore, session_id: &str, reason: GateReason) {
    let now = Utc::now().timestamp_millis();
    facts.push(vec![tern_facts::Fact::new(
        "js_gate_open",
        vec![
            Atom::Str(session_id.to_string()),
            Atom::Str(reason.as_str().to_string()),
        ],
        now,
    )]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_facts::Fact;

    #[test]
    fn denies_when_no_reason_supplied() {
        let facts = FactStore::new(100);
        let err = check_gate(&facts, "s1", &GateRequest::default(), 600_000).unwrap_err();
        assert_eq!(err.required_reasons.len(), 4);
    }

    #[test]
    fn low_confidence_opens_when_recent_fact_present() {
        let facts = FactStore::new(100);
        open_gate(&facts, "s1", GateReason::LowConfidence);
        let req = GateRequest {
            gate_reason: Some(GateReason::LowConfidence),
            approved_by_handle: None,
        };
        assert!(check_gate(&facts, "s1", &req, 600_000).is_ok());
    }

    #[test]
    fn low_confidence_denied_outside_ttl() {
        let facts = FactStore::new(100);
        facts.push(vec![Fact::new(
            "js_gate_open",
            vec!["s1".into(), "low_confidence".into()],
            0,
        )]);
        let req = GateRequest {
            gate_reason: Some(GateReason::LowConfidence),
            approved_by_handle: None,
        };
        assert!(check_gate(&facts, "s1", &req, 1).is_err());
    }

    #[test]
    fn explicit_user_intent_requires_approved_handle() {
        let facts = FactStore::new(100);
        let req = GateRequest {
            gate_reason: Some(GateReason::ExplicitUserIntent),
            approved_by_handle: None,
        };
        assert!(check_gate(&facts, "s1", &req, 600_000).is_err());
    }

    #[test]
    fn explicit_user_intent_opens_with_matching_disclosure_handle() {
        let facts = FactStore::new(100);
        facts.push(vec![Fact::new(
            "disclosure_handle",
            vec!["s1".into(), "handle-1".into(), "reason".into()],
            Utc::now().timestamp_millis(),
        )]);
        let req = GateRequest {
            gate_reason: Some(GateReason::ExplicitUserIntent),
            approved_by_handle: Some("handle-1".to_string()),
        };
        assert!(check_gate(&facts, "s1", &req, 600_000).is_ok());
    }
}
