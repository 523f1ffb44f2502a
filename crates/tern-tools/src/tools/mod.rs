//! The four progressive tool implementations, plus the argument-extraction
//! and action-candidate helpers shared across them.

pub mod act;
pub mod mangle;
pub mod observe;
pub mod reason;

use chrono::Utc;
use serde_json::Value;

use tern_reason::ReasoningEngine;

use crate::envelope::View;
use crate::error::ToolError;

/// The session id every operation is scoped to. Required on every call —
/// there is no "current session" implicitly threaded through the
/// dispatcher.
pub fn session_id_arg(args: &Value) -> Result<String, ToolError> {
    str_arg(args, "session_id")
        .map(str::to_string)
        .ok_or_else(|| ToolError::Validation("missing required field: session_id".to_string()))
}

pub fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

pub fn str_arg_required(args: &Value, key: &str) -> Result<String, ToolError> {
    str_arg(args, key)
        .map(str::to_string)
        .ok_or_else(|| ToolError::Validation(format!("missing required field: {key}")))
}

pub fn bool_arg(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub fn i64_arg(args: &Value, key: &str, default: i64) -> i64 {
    args.get(key).and_then(Value::as_i64).unwrap_or(default)
}

pub fn u64_arg(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(default)
}

/// `view` is shared by all four tools and always optional; callers fall
/// back to [`View::default`] (`compact`) on a missing or unrecognised value
/// rather than erroring, since output volume is never itself a contract
/// violation.
pub fn view_arg(args: &Value) -> View {
    str_arg(args, "view")
        .and_then(View::parse)
        .unwrap_or_default()
}

pub fn str_array_arg(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// The quiet window `act`'s `await_stable` waits for and `observe` checks
/// against when deciding whether a session still looks like it's loading.
pub const DEFAULT_QUIET_MS: i64 = 500;

/// True when the most recent `dom_updated` fact for `session_id` is still
/// within the quiet window — the same "hasn't settled yet" signal
/// `await_stable` polls for, surfaced here so `observe` can steer the agent
/// toward waiting instead of acting on a half-rendered page.
pub fn is_loading(facts: &tern_facts::FactStore, session_id: &str) -> bool {
    facts
        .by_predicate_and_key("dom_updated", session_id)
        .into_iter()
        .map(|f| f.timestamp)
        .max()
        .is_some_and(|last| now_ms() - last < DEFAULT_QUIET_MS)
}

/// Suggests a concrete input value for a form field from its label: known
/// patterns (`email`, `password`, `phone`, `name`) get a plausible
/// placeholder; anything else falls back to a generic placeholder flagged
/// `requires_user_input`.
pub fn suggested_input_value(label: &str) -> (String, bool) {
    let lower = label.to_lowercase();
    if lower.contains("email") {
        ("user@example.com".to_string(), false)
    } else if lower.contains("password") {
        ("<password>".to_string(), true)
    } else if lower.contains("phone") {
        ("+15555550123".to_string(), false)
    } else if lower.contains("name") {
        ("Jordan Avery".to_string(), false)
    } else {
        ("<value>".to_string(), true)
    }
}

/// A ranked next-step suggestion derived from `action_candidate`, shared by
/// `observe`'s action-planning mode and `reason`'s recommendation list.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCandidate {
    pub ref_id: String,
    pub label: String,
    pub action: String,
    pub priority: i64,
    pub reason: String,
}

/// A non-element action candidate (e.g. "press Escape to dismiss a modal").
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalAction {
    pub action: String,
    pub priority: i64,
    pub reason: String,
}

/// Queries `action_candidate(S, Ref, Label, Action, Priority, Reason)` for
/// `session_id` and returns the rows as typed candidates.
pub fn action_candidates(reasoning: &ReasoningEngine, session_id: &str) -> Vec<ActionCandidate> {
    reasoning
        .evaluate("action_candidate")
        .into_iter()
        .filter(|f| f.args.first().and_then(|a| a.as_str()) == Some(session_id))
        .filter_map(|f| {
            Some(ActionCandidate {
                ref_id: f.args.get(1)?.as_str()?.to_string(),
                label: f.args.get(2)?.to_string(),
                action: f.args.get(3)?.as_str()?.to_string(),
                priority: f.args.get(4)?.as_int()?,
                reason: f.args.get(5)?.as_str()?.to_string(),
            })
        })
        .collect()
}

/// Queries `global_action(S, Action, Priority, Reason)` for `session_id`.
pub fn global_actions(reasoning: &ReasoningEngine, session_id: &str) -> Vec<GlobalAction> {
    reasoning
        .evaluate("global_action")
        .into_iter()
        .filter(|f| f.args.first().and_then(|a| a.as_str()) == Some(session_id))
        .filter_map(|f| {
            Some(GlobalAction {
                action: f.args.get(1)?.as_str()?.to_string(),
                priority: f.args.get(2)?.as_int()?,
                reason: f.args.get(3)?.as_str()?.to_string(),
            })
        })
        .collect()
}

/// Deduplicates action candidates by semantic key (ref for element actions,
/// href for `navigate`), keeping only the highest-priority candidate per
/// key. Ties keep the first one encountered so the result stays
/// deterministic for a fixed input order.
pub fn dedup_action_candidates(candidates: Vec<ActionCandidate>) -> Vec<ActionCandidate> {
    use std::collections::HashMap;
    let mut best: HashMap<String, ActionCandidate> = HashMap::new();
    for candidate in candidates {
        let key = if candidate.action == "navigate" {
            format!("navigate:{}", candidate.label)
        } else {
            format!("ref:{}", candidate.ref_id)
        };
        best.entry(key)
            .and_modify(|existing| {
                if candidate.priority > existing.priority {
                    *existing = candidate.clone();
                }
            })
            .or_insert(candidate);
    }
    let mut out: Vec<ActionCandidate> = best.into_values().collect();
    out.sort_by(|a, b| b.priority.cmp(&a.priority));
    out
}

/// Extracts `scheme://host[:port]` from an absolute URL.
fn origin_of(url: &str) -> Option<String> {
    let scheme_end = url.find("://")? + 3;
    let rest = &url[scheme_end..];
    let host_end = rest.find('/').unwrap_or(rest.len());
    Some(format!("{}{}", &url[..scheme_end], &rest[..host_end]))
}

/// Resolves a navigation candidate's `href` against the session's current
/// URL, so a relative link like `/about` becomes an absolute URL a `navigate`
/// operation can use directly. Already-absolute hrefs pass through unchanged;
/// when no current URL is known the href is returned as-is.
pub fn resolve_navigate_url(current_url: Option<&str>, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match current_url.and_then(origin_of) {
        Some(origin) => {
            if href.starts_with('/') {
                format!("{origin}{href}")
            } else {
                format!("{origin}/{href}")
            }
        }
        None => href.to_string(),
    }
}

/// Looks up `current_url(S, Url)` for `session_id`, as several recommendation
/// paths need the session's current origin to resolve relative hrefs.
pub fn current_url_for(reasoning: &ReasoningEngine, session_id: &str) -> Option<String> {
    reasoning
        .query("current_url(S, Url)")
        .ok()?
        .into_iter()
        .find(|row| row.get("S").and_then(|a| a.as_str()) == Some(session_id))
        .and_then(|row| row.get("Url").map(|a| a.to_string()))
}

/// Deduplicates global actions by their action name, keeping the
/// highest-priority instance.
pub fn dedup_global_actions(actions: Vec<GlobalAction>) -> Vec<GlobalAction> {
    use std::collections::HashMap;
    let mut best: HashMap<String, GlobalAction> = HashMap::new();
    for action in actions {
        best.entry(action.action.clone())
            .and_modify(|existing| {
                if action.priority > existing.priority {
                    *existing = action.clone();
                }
            })
            .or_insert(action);
    }
    let mut out: Vec<GlobalAction> = best.into_values().collect();
    out.sort_by(|a, b| b.priority.cmp(&a.priority));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(ref_id: &str, action: &str, priority: i64) -> ActionCandidate {
        ActionCandidate {
            ref_id: ref_id.to_string(),
            label: ref_id.to_string(),
            action: action.to_string(),
            priority,
            reason: "test".to_string(),
        }
    }

    #[test]
    fn dedup_keeps_highest_priority_per_ref() {
        let candidates = vec![candidate("btn-1", "click", 60), candidate("btn-1", "click", 80)];
        let deduped = dedup_action_candidates(candidates);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].priority, 80);
    }

    #[test]
    fn dedup_keeps_separate_refs_distinct() {
        let candidates = vec![candidate("btn-1", "click", 60), candidate("btn-2", "click", 80)];
        let deduped = dedup_action_candidates(candidates);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn resolve_navigate_url_joins_relative_href_to_current_origin() {
        let resolved = resolve_navigate_url(Some("https://example.com/home"), "/about");
        assert_eq!(resolved, "https://example.com/about");
    }

    #[test]
    fn resolve_navigate_url_passes_through_absolute_href() {
        let resolved = resolve_navigate_url(Some("https://example.com/home"), "https://other.com/x");
        assert_eq!(resolved, "https://other.com/x");
    }

    #[test]
    fn resolve_navigate_url_falls_back_without_current_url() {
        let resolved = resolve_navigate_url(None, "/about");
        assert_eq!(resolved, "/about");
    }
}
