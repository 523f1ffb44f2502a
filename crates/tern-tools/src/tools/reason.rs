//! `reason` — derives a health verdict, confidence score, and concrete
//! next-action recommendations for a session from the Reasoning Engine's
//! derived predicates.

use async_trait::async_trait;
use serde_json::{json, Value};

use tern_facts::{Atom, Fact};

use crate::dispatcher::{Tool, ToolContext};
use crate::envelope::{evidence_handle, Status, ToolResponse, View};
use crate::error::ToolError;
use crate::gate::{open_gate, GateReason};
use crate::tools::{
    action_candidates, current_url_for, dedup_action_candidates, dedup_global_actions,
    global_actions, now_ms, resolve_navigate_url, session_id_arg, str_arg, suggested_input_value,
    view_arg,
};

const LOW_CONFIDENCE_THRESHOLD: f64 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    Health,
    NextBestAction,
    BlockingIssue,
    WhyFailed,
    WhatChangedSince,
}

impl Topic {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "health" => Some(Topic::Health),
            "next_best_action" => Some(Topic::NextBestAction),
            "blocking_issue" => Some(Topic::BlockingIssue),
            "why_failed" => Some(Topic::WhyFailed),
            "what_changed_since" => Some(Topic::WhatChangedSince),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Topic::Health => "health",
            Topic::NextBestAction => "next_best_action",
            Topic::BlockingIssue => "blocking_issue",
            Topic::WhyFailed => "why_failed",
            Topic::WhatChangedSince => "what_changed_since",
        }
    }
}

/// `intent` presets: `(topic, view)` defaults.
fn intent_defaults(intent: &str) -> Option<(Topic, View)> {
    match intent {
        "triage" => Some((Topic::Health, View::Compact)),
        "act_now" => Some((Topic::NextBestAction, View::Compact)),
        "debug_failure" => Some((Topic::WhyFailed, View::Full)),
        "unblock" => Some((Topic::BlockingIssue, View::Compact)),
        _ => None,
    }
}

fn scoped(facts: Vec<Fact>, session_id: &str) -> Vec<Fact> {
    facts
        .into_iter()
        .filter(|f| f.args.first().and_then(Atom::as_str) == Some(session_id))
        .collect()
}

pub struct ReasonTool;

#[async_trait]
impl Tool for ReasonTool {
    fn name(&self) -> &'static str {
        "browser-reason"
    }

    fn description(&self) -> &'static str {
        "Derives a health verdict, confidence score, and concrete next-action \
         recommendations for a session from the reasoning engine's derived \
         predicates."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "topic": { "type": "string", "enum": ["health","next_best_action","blocking_issue","why_failed","what_changed_since"] },
                "intent": { "type": "string", "enum": ["triage","act_now","debug_failure","unblock"] },
                "view": { "type": "string", "enum": ["summary","compact","full"] },
                "since_ms": { "type": "integer" }
            },
            "required": ["session_id"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolResponse {
        let view = view_arg(&args);
        match self.handle(ctx, &args).await {
            Ok(response) => response,
            Err(err) => err.into_response(view),
        }
    }
}

impl ReasonTool {
    async fn handle(&self, ctx: &ToolContext, args: &Value) -> Result<ToolResponse, ToolError> {
        let session_id = session_id_arg(args)?;
        let intent = str_arg(args, "intent").and_then(intent_defaults);
        let (topic_default, view_default) = intent.unwrap_or((Topic::Health, View::Compact));
        let topic = str_arg(args, "topic").and_then(Topic::parse).unwrap_or(topic_default);
        let view = str_arg(args, "view").and_then(View::parse).unwrap_or(view_default);
        let since_ms = args.get("since_ms").and_then(Value::as_i64);

        let failed = scoped(ctx.reasoning.evaluate("failed_request"), &session_id);
        let slow = scoped(ctx.reasoning.evaluate("slow_api"), &session_id);
        let root_causes = scoped(ctx.reasoning.evaluate("root_cause"), &session_id);
        let blocked = scoped(ctx.reasoning.evaluate("interaction_blocked"), &session_id);
        let visible_errors = scoped(ctx.reasoning.evaluate("user_visible_error"), &session_id);
        let success_toasts: Vec<Fact> = ctx
            .facts
            .by_predicate_and_key("toast_notification", &session_id)
            .into_iter()
            .filter(|f| f.args.get(2).and_then(Atom::as_str) == Some("success"))
            .collect();

        let contradictions = if !failed.is_empty() && !success_toasts.is_empty() {
            success_toasts.len()
        } else {
            0
        };

        let status = if !failed.is_empty() || !visible_errors.is_empty() || contradictions > 0 {
            Status::Error
        } else if !slow.is_empty() || !blocked.is_empty() {
            Status::Warning
        } else {
            Status::Ok
        };

        let confidence = compute_confidence(failed.len(), slow.len(), root_causes.len(), contradictions);

        let candidates = dedup_action_candidates(action_candidates(&ctx.reasoning, &session_id));
        let globals = dedup_global_actions(global_actions(&ctx.reasoning, &session_id));
        let current_url = current_url_for(&ctx.reasoning, &session_id);
        let mut recommendations: Vec<Value> = candidates
            .iter()
            .map(|c| {
                let op = if c.action == "fill" {
                    let (value, requires_user_input) = suggested_input_value(&c.label);
                    json!({
                        "tool": "browser-act",
                        "operation": { "type": "fill", "ref": c.ref_id, "value": value },
                        "requires_user_input": requires_user_input,
                        "reason": c.reason,
                        "priority": c.priority,
                    })
                } else if c.action == "navigate" {
                    let url = resolve_navigate_url(current_url.as_deref(), &c.label);
                    json!({
                        "tool": "browser-act",
                        "operation": { "type": "navigate", "url": url },
                        "requires_user_input": false,
                        "reason": c.reason,
                        "priority": c.priority,
                    })
                } else {
                    json!({
                        "tool": "browser-act",
                        "operation": { "type": "interact", "ref": c.ref_id, "action": c.action },
                        "requires_user_input": false,
                        "reason": c.reason,
                        "priority": c.priority,
                    })
                };
                op
            })
            .chain(globals.iter().map(|g| {
                json!({
                    "tool": "browser-act",
                    "operation": { "type": "key", "key": "Escape" },
                    "requires_user_input": false,
                    "reason": g.reason,
                    "priority": g.priority,
                })
            }))
            .collect();

        if !failed.is_empty() || !root_causes.is_empty() {
            recommendations.push(json!({
                "tool": "browser-mangle",
                "operation": { "type": "read", "handle": evidence_handle("browser-reason", &session_id, "failed_requests") },
                "requires_user_input": false,
                "reason": "expand failure evidence",
                "priority": 50,
            }));
        }

        let what_changed_since = if topic == Topic::WhatChangedSince || since_ms.is_some() {
            Some(changed_since(&failed, &slow, &visible_errors, &blocked, &root_causes, since_ms.unwrap_or(0)))
        } else {
            None
        };

        let t = now_ms();
        let pct = (confidence * 100.0).round() as i64;
        ctx.facts.push(vec![Fact::new(
            "confidence_score",
            vec![session_id.clone().into(), topic.as_str().into(), pct.into(), t.into()],
            t,
        )]);

        let low_confidence = confidence < LOW_CONFIDENCE_THRESHOLD;
        let no_recommendations = recommendations.is_empty();
        if low_confidence {
            open_gate(&ctx.facts, &session_id, GateReason::LowConfidence);
        }
        if contradictions >= 1 {
            open_gate(&ctx.facts, &session_id, GateReason::ContradictionDetected);
        }
        if no_recommendations {
            open_gate(&ctx.facts, &session_id, GateReason::NoMatchingTool);
        }
        let expansion_suggested = low_confidence || contradictions >= 1 || no_recommendations;

        let summary = match status {
            Status::Error => format!(
                "{} failure(s), {} contradiction(s) detected for {session_id}",
                failed.len() + visible_errors.len(),
                contradictions
            ),
            Status::Warning => format!("{} slow or blocking condition(s) for {session_id}", slow.len() + blocked.len()),
            Status::Ok => format!("session {session_id} healthy"),
        };

        let mut data = json!({
            "topic": topic.as_str(),
            "confidence": confidence,
            "failed_requests": failed.len(),
            "slow_requests": slow.len(),
            "root_causes": root_causes.len(),
            "blocking_issues": blocked.len(),
            "contradictions": contradictions,
            "recommendations": recommendations,
            "expansion_suggested": expansion_suggested,
        });
        if let Some(feed) = what_changed_since {
            data["what_changed_since"] = feed;
        }

        let mut evidence = Vec::new();
        if !failed.is_empty() {
            evidence.push(evidence_handle("browser-reason", &session_id, "failed_requests"));
        }
        if !root_causes.is_empty() {
            evidence.push(evidence_handle("browser-reason", &session_id, "root_causes"));
        }

        Ok(ToolResponse {
            success: true,
            status,
            summary,
            view,
            data: Some(data),
            evidence_handles: evidence,
            truncated: false,
            next_step: None,
        })
    }
}

/// Combines failure counts, root-cause presence, and a contradiction
/// penalty into a confidence score bounded to `[0.10, 0.99]`, per section
/// 4.5.3.
fn compute_confidence(failed: usize, slow: usize, root_causes: usize, contradictions: usize) -> f64 {
    let mut score = 0.95;
    score -= 0.10 * failed.min(5) as f64;
    score -= 0.05 * slow.min(5) as f64;
    if failed > 0 && root_causes > 0 {
        score += 0.05;
    }
    score -= 0.20 * contradictions as f64;
    score.clamp(0.10, 0.99)
}

fn changed_since(
    failed: &[Fact],
    slow: &[Fact],
    visible_errors: &[Fact],
    blocked: &[Fact],
    root_causes: &[Fact],
    since_ms: i64,
) -> Value {
    let mut events: Vec<(i64, Value)> = Vec::new();
    for f in failed {
        if f.timestamp >= since_ms {
            events.push((f.timestamp, json!({ "type": "failed_request", "timestamp": f.timestamp, "args": f.args })));
        }
    }
    for f in slow {
        if f.timestamp >= since_ms {
            events.push((f.timestamp, json!({ "type": "slow_api", "timestamp": f.timestamp, "args": f.args })));
        }
    }
    for f in visible_errors {
        if f.timestamp >= since_ms {
            events.push((f.timestamp, json!({ "type": "user_visible_error", "timestamp": f.timestamp, "args": f.args })));
        }
    }
    for f in blocked {
        if f.timestamp >= since_ms {
            events.push((f.timestamp, json!({ "type": "blocking_issue", "timestamp": f.timestamp, "args": f.args })));
        }
    }
    for f in root_causes {
        if f.timestamp >= since_ms {
            events.push((f.timestamp, json!({ "type": "root_cause", "timestamp": f.timestamp, "args": f.args })));
        }
    }
    events.sort_by(|a, b| b.0.cmp(&a.0));
    Value::Array(events.into_iter().map(|(_, v)| v).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tern_facts::FactStore;
    use tern_reason::ReasoningEngine;
    use tern_session::SessionManager;

    fn ctx_with_facts(facts: Vec<Fact>) -> (ToolContext, String) {
        let store = Arc::new(FactStore::new(1_000));
        store.push(facts);
        let reasoning = Arc::new(ReasoningEngine::new(store.clone()));
        let sessions = Arc::new(SessionManager::new());
        (ToolContext::new(store, reasoning, sessions), "s1".to_string())
    }

    #[tokio::test]
    async fn healthy_session_reports_ok_status() {
        let (ctx, session_id) = ctx_with_facts(vec![]);
        let tool = ReasonTool;
        let response = tool.call(&ctx, json!({ "session_id": session_id })).await;
        assert_eq!(response.status, Status::Ok);
    }

    #[tokio::test]
    async fn failed_request_drives_error_status_and_opens_low_confidence_gate() {
        let (ctx, session_id) = ctx_with_facts(vec![
            Fact::new(
                "net_request",
                vec!["s1".into(), "r1".into(), "GET".into(), "/api/x".into(), "fetch".into(), 1.into()],
                1,
            ),
            Fact::new("net_response", vec!["s1".into(), "r1".into(), 500.into(), 1.into(), 1.into()], 2),
        ]);
        let tool = ReasonTool;
        let response = tool.call(&ctx, json!({ "session_id": session_id, "topic": "why_failed" })).await;
        assert_eq!(response.status, Status::Error);
        assert!(ctx.facts.by_predicate("confidence_score").len() == 1);
    }

    #[tokio::test]
    async fn success_toast_alongside_failure_is_a_contradiction() {
        let (ctx, session_id) = ctx_with_facts(vec![
            Fact::new(
                "net_request",
                vec!["s1".into(), "r1".into(), "GET".into(), "/api/x".into(), "fetch".into(), 1.into()],
                1,
            ),
            Fact::new("net_response", vec!["s1".into(), "r1".into(), 500.into(), 1.into(), 1.into()], 2),
            Fact::new(
                "toast_notification",
                vec!["s1".into(), "Saved!".into(), "success".into(), "dom".into()],
                3,
            ),
        ]);
        let tool = ReasonTool;
        let response = tool.call(&ctx, json!({ "session_id": session_id })).await;
        let data = response.data.unwrap();
        assert_eq!(data["contradictions"], json!(1));
        assert_eq!(data["expansion_suggested"], json!(true));
        assert!(ctx
            .facts
            .by_predicate_and_key("js_gate_open", "s1")
            .iter()
            .any(|f| f.args.get(1).and_then(|a| a.as_str()) == Some("contradiction_detected")));
    }

    #[tokio::test]
    async fn navigate_recommendation_resolves_relative_href_against_current_origin() {
        let (ctx, session_id) = ctx_with_facts(vec![
            Fact::new("navigation_event", vec!["s1".into(), "https://example.com/home".into()], 1),
            Fact::new(
                "interactive",
                vec!["s1".into(), "a-about".into(), "a".into(), "/about".into(), "navigate".into()],
                2,
            ),
            Fact::new("element_enabled", vec!["s1".into(), "a-about".into()], 2),
        ]);
        let tool = ReasonTool;
        let response = tool.call(&ctx, json!({ "session_id": session_id })).await;
        let recs = response.data.unwrap()["recommendations"].as_array().unwrap().clone();
        let nav = recs
            .iter()
            .find(|r| r["operation"]["type"] == json!("navigate"))
            .expect("expected a navigate recommendation");
        assert_eq!(nav["operation"]["url"], json!("https://example.com/about"));
    }
}
