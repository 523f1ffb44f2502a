//! Built-in derivations that need more than pure joins and comparisons.
//!
//! The reasoning engine is deliberately negation-free (see the rule
//! semantics in [`crate::types`]), and the hand-written parser has no
//! notion of a fact's own `timestamp` metadata as a bindable value — only
//! the explicit args a predicate was declared with. Two kinds of
//! derivation fall outside what [`crate::stdlib`]'s plain rule text can
//! express, split into two tiers here:
//!
//! **Simple natives** (`current_url`, `repeated_toast_error`) compute a
//! latest-wins aggregate or a distinct-instance count over base facts
//! only. These are injected into the working set *before* the rule
//! fixpoint runs (see [`crate::engine::ReasoningEngine::derive_all`]), so
//! ordinary rules (`login_succeeded`) can join against them like any
//! other predicate.
//!
//! **Complex natives** (`caused_by`, `error_chain`,
//! `toast_after_api_failure`, `api_backend_correlation`, `root_cause`)
//! need a temporal-proximity join against a fact's `timestamp` field
//! directly — "console error within 5s of the failed response" has no
//! representation as a rule variable once `net_response`'s declared args
//! are just `(S, Id, Status, Latency, Duration)` with no `T`. These run
//! only when specifically asked for via `evaluate`/`query`, after the
//! rule-derived predicates they depend on (`failed_request`) have already
//! been computed.

use std::collections::HashMap;

use tern_facts::{Atom, Fact, FactStore};

/// Window within which a console error is considered caused by a failed
/// request, and within which a toast is considered a reaction to one.
const CAUSAL_WINDOW_MS: i64 = 5_000;

pub const NATIVE_PREDICATES: &[&str] = &["current_url", "repeated_toast_error"];

const COMPLEX_NATIVE_PREDICATES: &[&str] = &[
    "caused_by",
    "error_chain",
    "toast_after_api_failure",
    "api_backend_correlation",
    "root_cause",
];

pub fn is_native(predicate: &str) -> bool {
    NATIVE_PREDICATES.contains(&predicate)
}

pub fn is_complex_native(predicate: &str) -> bool {
    COMPLEX_NATIVE_PREDICATES.contains(&predicate)
}

/// `current_url(S, Url)` — the most recent `navigation_event` per session.
pub fn current_url(store: &FactStore) -> Vec<Fact> {
    let mut newest: HashMap<String, (String, i64)> = HashMap::new();
    for fact in store.by_predicate("navigation_event") {
        let (Some(session), Some(url)) = (fact.args.first(), fact.args.get(1)) else {
            continue;
        };
        let Some(session) = session.as_str() else {
            continue;
        };
        let Some(url) = url.as_str() else { continue };
        let entry = newest
            .entry(session.to_string())
            .or_insert_with(|| (url.to_string(), fact.timestamp));
        if fact.timestamp >= entry.1 {
            *entry = (url.to_string(), fact.timestamp);
        }
    }
    newest
        .into_iter()
        .map(|(session, (url, ts))| {
            Fact::new("current_url", vec![Atom::Str(session), Atom::Str(url)], ts)
        })
        .collect()
}

/// `repeated_toast_error(S, Text)` — the same toast text surfaced at least
/// twice (as distinct fact instances, not a self-match) within the
/// session's window.
pub fn repeated_toast_error(store: &FactStore) -> Vec<Fact> {
    let mut counts: HashMap<(String, String), (u64, i64)> = HashMap::new();
    for fact in store.by_predicate("toast_notification") {
        let (Some(session), Some(text)) = (fact.args.first(), fact.args.get(1)) else {
            continue;
        };
        let (Some(session), Some(text)) = (session.as_str(), text.as_str()) else {
            continue;
        };
        let key = (session.to_string(), text.to_string());
        let entry = counts.entry(key).or_insert((0, fact.timestamp));
        entry.0 += 1;
        entry.1 = entry.1.max(fact.timestamp);
    }
    counts
        .into_iter()
        .filter(|(_, (count, _))| *count >= 2)
        .map(|((session, text), (_, ts))| {
            Fact::new(
                "repeated_toast_error",
                vec![Atom::Str(session), Atom::Str(text)],
                ts,
            )
        })
        .collect()
}

pub fn evaluate_simple(predicate: &str, store: &FactStore) -> Vec<Fact> {
    match predicate {
        "current_url" => current_url(store),
        "repeated_toast_error" => repeated_toast_error(store),
        _ => Vec::new(),
    }
}

/// Looks up the `net_response` fact for `(session, request_id)` so
/// complex natives can get at its real timestamp, which is metadata on
/// the fact record rather than one of its four declared args.
fn response_fact<'a>(store: &'a FactStore, session: &str, request_id: &str) -> Option<Fact> {
    store
        .by_predicate_and_key("net_response", session)
        .into_iter()
        .find(|f| f.args.get(1).and_then(|a| a.as_str()) == Some(request_id))
}

/// `caused_by(S, ConsoleMsg, ReqId)` — an error-level console message that
/// landed within [`CAUSAL_WINDOW_MS`] after a failed request's response.
pub fn caused_by(store: &FactStore, failed_requests: &[Fact]) -> Vec<Fact> {
    let mut out = Vec::new();
    for failure in failed_requests {
        let (Some(session), Some(req_id)) = (
            failure.args.first().and_then(|a| a.as_str()),
            failure.args.get(1).and_then(|a| a.as_str()),
        ) else {
            continue;
        };
        let Some(response) = response_fact(store, session, req_id) else {
            continue;
        };
        for console in store.by_predicate_and_key("console_event", session) {
            let Some(level) = console.args.get(1).and_then(|a| a.as_str()) else {
                continue;
            };
            if level != "error" {
                continue;
            }
            let delta = console.timestamp - response.timestamp;
            if !(0..=CAUSAL_WINDOW_MS).contains(&delta) {
                continue;
            }
            let Some(msg) = console.args.get(2).cloned() else {
                continue;
            };
            out.push(Fact::new(
                "caused_by",
                vec![Atom::Str(session.to_string()), msg, Atom::Str(req_id.to_string())],
                console.timestamp,
            ));
        }
    }
    out
}

/// `error_chain(S, Msg, ReqId, Url, Status)` — `caused_by` joined back
/// against the failed request's URL and status for a single readable row.
pub fn error_chain(store: &FactStore, failed_requests: &[Fact]) -> Vec<Fact> {
    let mut by_id: HashMap<(String, String), &Fact> = HashMap::new();
    for failure in failed_requests {
        let (Some(session), Some(req_id)) = (
            failure.args.first().and_then(|a| a.as_str()),
            failure.args.get(1).and_then(|a| a.as_str()),
        ) else {
            continue;
        };
        by_id.insert((session.to_string(), req_id.to_string()), failure);
    }
    caused_by(store, failed_requests)
        .into_iter()
        .filter_map(|cb| {
            let session = cb.args.first()?.as_str()?.to_string();
            let msg = cb.args.get(1)?.clone();
            let req_id = cb.args.get(2)?.as_str()?.to_string();
            let failure = by_id.get(&(session.clone(), req_id.clone()))?;
            let url = failure.args.get(2)?.clone();
            let status = failure.args.get(3)?.clone();
            Some(Fact::new(
                "error_chain",
                vec![Atom::Str(session), msg, Atom::Str(req_id), url, status],
                cb.timestamp,
            ))
        })
        .collect()
}

/// `toast_after_api_failure(S, Text, ReqId, Url, Status, DeltaT)` — a
/// toast notification within [`CAUSAL_WINDOW_MS`] after a failed request.
pub fn toast_after_api_failure(store: &FactStore, failed_requests: &[Fact]) -> Vec<Fact> {
    let mut out = Vec::new();
    for failure in failed_requests {
        let (Some(session), Some(req_id), Some(url), Some(status)) = (
            failure.args.first().and_then(|a| a.as_str()),
            failure.args.get(1).and_then(|a| a.as_str()),
            failure.args.get(2).cloned(),
            failure.args.get(3).cloned(),
        ) else {
            continue;
        };
        let Some(response) = response_fact(store, session, req_id) else {
            continue;
        };
        for toast in store.by_predicate_and_key("toast_notification", session) {
            let delta = toast.timestamp - response.timestamp;
            if !(0..=CAUSAL_WINDOW_MS).contains(&delta) {
                continue;
            }
            let Some(text) = toast.args.get(1).cloned() else {
                continue;
            };
            out.push(Fact::new(
                "toast_after_api_failure",
                vec![
                    Atom::Str(session.to_string()),
                    text,
                    Atom::Str(req_id.to_string()),
                    url.clone(),
                    status.clone(),
                    Atom::Int(delta),
                ],
                toast.timestamp,
            ));
        }
    }
    out
}

/// `api_backend_correlation(S, ReqId, Url, Status, BackendMsg, DeltaT)` —
/// a backend log entry joined to a failed request via a shared
/// correlation key (`docker_log_correlation`'s `KeyValue`, matched against
/// the request id). Empty unless the docker integration is enabled and has
/// actually emitted correlation facts — callers do not need to gate on a
/// feature flag here, an empty `docker_log_correlation` predicate is
/// sufficient.
pub fn api_backend_correlation(store: &FactStore, failed_requests: &[Fact]) -> Vec<Fact> {
    let correlations = store.by_predicate("docker_log_correlation");
    let mut out = Vec::new();
    for failure in failed_requests {
        let (Some(session), Some(req_id), Some(url), Some(status)) = (
            failure.args.first().and_then(|a| a.as_str()),
            failure.args.get(1).and_then(|a| a.as_str()),
            failure.args.get(2).cloned(),
            failure.args.get(3).cloned(),
        ) else {
            continue;
        };
        let Some(response) = response_fact(store, session, req_id) else {
            continue;
        };
        for corr in &correlations {
            let Some(key_value) = corr.args.get(2).and_then(|a| a.as_str()) else {
                continue;
            };
            if key_value != req_id {
                continue;
            }
            let delta = corr.timestamp - response.timestamp;
            let Some(message) = corr.args.get(3).cloned() else {
                continue;
            };
            out.push(Fact::new(
                "api_backend_correlation",
                vec![
                    Atom::Str(session.to_string()),
                    Atom::Str(req_id.to_string()),
                    url.clone(),
                    status.clone(),
                    message,
                    Atom::Int(delta),
                ],
                corr.timestamp,
            ));
        }
    }
    out
}

/// `root_cause(S, Msg, Source, Cause)` — the highest-confidence
/// explanation available: an `error_chain` row (source = "console",
/// confidence from temporal proximity) beats a bare `user_visible_error`
/// (source = "toast", no causal link established) for the same session.
pub fn root_cause(store: &FactStore, failed_requests: &[Fact], visible_errors: &[Fact]) -> Vec<Fact> {
    let mut best: HashMap<String, (i32, Fact)> = HashMap::new();
    for chain in error_chain(store, failed_requests) {
        let Some(session) = chain.args.first().and_then(|a| a.as_str()) else {
            continue;
        };
        let Some(msg) = chain.args.get(1).cloned() else {
            continue;
        };
        let Some(cause) = chain.args.get(2).cloned() else {
            continue;
        };
        let fact = Fact::new(
            "root_cause",
            vec![Atom::Str(session.to_string()), msg, Atom::Str("console".to_string()), cause],
            chain.timestamp,
        );
        best.entry(session.to_string())
            .and_modify(|(score, existing)| {
                if 2 > *score {
                    *score = 2;
                    *existing = fact.clone();
                }
            })
            .or_insert((2, fact));
    }
    for visible in visible_errors {
        let Some(session) = visible.args.first().and_then(|a| a.as_str()) else {
            continue;
        };
        if best.contains_key(session) {
            continue;
        }
        let Some(msg) = visible.args.get(1).cloned() else {
            continue;
        };
        let fact = Fact::new(
            "root_cause",
            vec![
                Atom::Str(session.to_string()),
                msg,
                Atom::Str("toast".to_string()),
                Atom::Str("unknown".to_string()),
            ],
            visible.timestamp,
        );
        best.insert(session.to_string(), (1, fact));
    }
    best.into_values().map(|(_, fact)| fact).collect()
}

pub fn evaluate_complex(
    predicate: &str,
    store: &FactStore,
    derived: &HashMap<String, Vec<Fact>>,
) -> Vec<Fact> {
    let empty = Vec::new();
    let failed_requests = derived.get("failed_request").unwrap_or(&empty);
    match predicate {
        "caused_by" => caused_by(store, failed_requests),
        "error_chain" => error_chain(store, failed_requests),
        "toast_after_api_failure" => toast_after_api_failure(store, failed_requests),
        "api_backend_correlation" => api_backend_correlation(store, failed_requests),
        "root_cause" => {
            let visible_errors = derived.get("user_visible_error").unwrap_or(&empty);
            root_cause(store, failed_requests, visible_errors)
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_url_picks_newest_navigation_per_session() {
        let store = FactStore::new(100);
        store.push(vec![
            Fact::new("navigation_event", vec!["s".into(), "/login".into()], 100),
            Fact::new("navigation_event", vec!["s".into(), "/dashboard".into()], 200),
        ]);
        let urls = current_url(&store);
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].args[1].as_str(), Some("/dashboard"));
    }

    #[test]
    fn repeated_toast_error_requires_at_least_two_instances() {
        let store = FactStore::new(100);
        store.push(vec![Fact::new(
            "toast_notification",
            vec!["s".into(), "Save failed".into(), "error".into(), "form".into()],
            1,
        )]);
        assert!(repeated_toast_error(&store).is_empty());
        store.push(vec![Fact::new(
            "toast_notification",
            vec!["s".into(), "Save failed".into(), "error".into(), "form".into()],
            2,
        )]);
        assert_eq!(repeated_toast_error(&store).len(), 1);
    }

    fn failed_request_fact(session: &str, id: &str, url: &str, status: i64) -> Fact {
        Fact::new(
            "failed_request",
            vec![
                Atom::Str(session.to_string()),
                Atom::Str(id.to_string()),
                Atom::Str(url.to_string()),
                Atom::Int(status),
            ],
            0,
        )
    }

    #[test]
    fn caused_by_links_console_error_within_window() {
        let store = FactStore::new(100);
        store.push(vec![
            Fact::new("net_response", vec!["s".into(), "r1".into(), 500.into(), 20.into(), 30.into()], 1000),
            Fact::new("console_event", vec!["s".into(), "error".into(), "TypeError: x".into(), 1100.into()], 1100),
        ]);
        let failures = vec![failed_request_fact("s", "r1", "/api/x", 500)];
        let rows = caused_by(&store, &failures);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].args[2].as_str(), Some("r1"));
    }

    #[test]
    fn caused_by_ignores_console_messages_outside_window() {
        let store = FactStore::new(100);
        store.push(vec![
            Fact::new("net_response", vec!["s".into(), "r1".into(), 500.into(), 20.into(), 30.into()], 1000),
            Fact::new("console_event", vec!["s".into(), "error".into(), "late".into(), 50_000.into()], 50_000),
        ]);
        let failures = vec![failed_request_fact("s", "r1", "/api/x", 500)];
        assert!(caused_by(&store, &failures).is_empty());
    }

    #[test]
    fn root_cause_prefers_console_chain_over_bare_visible_error() {
        let store = FactStore::new(100);
        store.push(vec![
            Fact::new("net_response", vec!["s".into(), "r1".into(), 500.into(), 20.into(), 30.into()], 1000),
            Fact::new("console_event", vec!["s".into(), "error".into(), "TypeError: x".into(), 1100.into()], 1100),
        ]);
        let failures = vec![failed_request_fact("s", "r1", "/api/x", 500)];
        let visible_errors = vec![Fact::new(
            "user_visible_error",
            vec!["s".into(), "Something went wrong".into()],
            1200,
        )];
        let rows = root_cause(&store, &failures, &visible_errors);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].args[2].as_str(), Some("console"));
    }

    #[test]
    fn root_cause_falls_back_to_visible_error_without_a_console_chain() {
        let store = FactStore::new(100);
        store.push(vec![Fact::new(
            "net_response",
            vec!["s".into(), "r1".into(), 500.into(), 20.into(), 30.into()],
            1000,
        )]);
        let failures = vec![failed_request_fact("s", "r1", "/api/x", 500)];
        let visible_errors = vec![Fact::new(
            "user_visible_error",
            vec!["s".into(), "Something went wrong".into()],
            1200,
        )];
        let rows = root_cause(&store, &failures, &visible_errors);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].args[2].as_str(), Some("toast"));
    }
}
