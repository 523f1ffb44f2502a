//! The default rule program: every derivation expressible as a pure
//! join/comparison over base facts (plus the handful of native predicates
//! in [`crate::native`], which are injected into the working set before
//! this program runs).
//!
//! Loaded by [`crate::engine::ReasoningEngine::new`] before any
//! `mangle.schema_path` program is layered on top via `add_rule`.

/// Rule text for every derivation this engine ships with out of the box.
///
/// `caused_by`, `error_chain`, `toast_after_api_failure`,
/// `api_backend_correlation`, and `root_cause` are deliberately absent —
/// each needs a temporal-proximity join against a fact's own `timestamp`
/// metadata (e.g. "within 5s of the failed response"), which is not a
/// value the generic parser/evaluator can bind as a rule variable. Those
/// five are computed directly over the fact store in [`crate::native`].
pub const DEFAULT_PROGRAM: &str = r#"
failed_request(S, Id, Url, Status) :- net_request(S, Id, _, Url, _, _), net_response(S, Id, Status, _, _), Status >= 400.

slow_api(S, Id, Url, Duration) :- net_request(S, Id, _, Url, _, _), net_response(S, Id, _, _, Duration), Duration > 1000.

cascading_failure(S, Child, Parent) :- failed_request(S, Child, _, _), net_request(S, Child, _, _, Parent, _), failed_request(S, Parent, _, _).

interaction_blocked(S, Reason) :- modal_present(S, Reason, _).

user_visible_error(S, Text) :- toast_notification(S, Text, "error", _).

global_action(S, "press_escape", 90, "modal_blocking") :- interaction_blocked(S, _).

action_candidate(S, Ref, Label, "click", 80, "enabled_button") :- interactive(S, Ref, "button", Label, "click"), element_enabled(S, Ref).

action_candidate(S, Ref, Label, "submit", 85, "enabled_submit") :- interactive(S, Ref, "submit", Label, "submit"), element_enabled(S, Ref).

action_candidate(S, Ref, Href, "navigate", 60, "visible_link") :- interactive(S, Ref, "a", Href, "navigate"), element_enabled(S, Ref).

action_candidate(S, Ref, Label, "fill", 75, "empty_required_field") :- interactive(S, Ref, "input", Label, "fill"), element_enabled(S, Ref).

login_succeeded(S) :- url_before_submit(S, UrlBefore, _), current_url(S, UrlAfter), UrlBefore != UrlAfter.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::split_statements;

    #[test]
    fn default_program_parses_as_individual_statements() {
        let stmts = split_statements(DEFAULT_PROGRAM);
        assert!(stmts.len() >= 8);
        for stmt in stmts {
            crate::parser::parse_rule(&stmt).unwrap_or_else(|e| {
                panic!("failed to parse stdlib rule {stmt:?}: {e}");
            });
        }
    }
}
