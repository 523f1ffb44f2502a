//! Bottom-up rule evaluator and the public `ReasoningEngine` surface.
//!
//! Evaluation re-derives the whole program against the current fact-store
//! snapshot every time a predicate is asked for, rather than maintaining a
//! true incremental semi-naive delta — at the scale this store is bounded
//! to (`fact_buffer_limit`, default 10 000) a full fixpoint is cheap, and
//! it sidesteps having to prove termination of a delta-tracking evaluator
//! against arbitrary operator-supplied rules. The result is cached and
//! invalidated on [`tern_facts::FactStore::generation`], which is the
//! "recompute" half of the Derivation Store's open choice (see
//! `DESIGN.md`); nothing here claims the cached value is visible through
//! `FactStore::all`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, trace};

use tern_facts::{Atom, Fact, FactStore};

use crate::error::ReasonError;
use crate::native;
use crate::parser::{self, parse_goal, parse_rule};
use crate::stdlib::DEFAULT_PROGRAM;
use crate::types::{ArithOp, BodyTerm, CompareOp, Literal, Rule, Row, Term};

const MAX_FIXPOINT_ITERATIONS: usize = 200;

/// A named collection of rules plus the fact store they reason over.
///
/// Cheap to clone (everything behind `Arc`); the convention throughout the
/// rest of the workspace is to construct one `ReasoningEngine` per process
/// and share it, mirroring how `FactStore` is shared.
#[derive(Clone)]
pub struct ReasoningEngine {
    facts: Arc<FactStore>,
    rules: Arc<RwLock<Vec<Rule>>>,
    cache: Arc<RwLock<Option<DerivationCache>>>,
}

struct DerivationCache {
    generation: u64,
    by_predicate: HashMap<String, Vec<Fact>>,
}

impl ReasoningEngine {
    /// Builds an engine over `facts`, pre-loaded with [`DEFAULT_PROGRAM`].
    pub fn new(facts: Arc<FactStore>) -> Self {
        let engine = Self {
            facts,
            rules: Arc::new(RwLock::new(Vec::new())),
            cache: Arc::new(RwLock::new(None)),
        };
        for stmt in parser::split_statements(DEFAULT_PROGRAM) {
            engine
                .add_rule(&stmt)
                .expect("built-in stdlib program must parse");
        }
        engine
    }

    pub fn facts(&self) -> &Arc<FactStore> {
        &self.facts
    }

    /// Convenience wrapper around [`FactStore::push`]; the derivation
    /// cache invalidates itself lazily off `FactStore::generation`, so no
    /// explicit invalidation call is needed here, but the method exists so
    /// callers reach for "push through the reasoning engine" uniformly.
    pub fn push_facts(&self, facts: Vec<Fact>) -> usize {
        self.facts.push(facts)
    }

    /// Parses and appends one or more `.`-terminated rule statements.
    /// Leaves the program unchanged on the first parse error.
    pub fn add_rule(&self, source_text: &str) -> Result<usize, ReasonError> {
        let statements = parser::split_statements(source_text);
        let mut parsed = Vec::with_capacity(statements.len());
        for stmt in &statements {
            parsed.push(parse_rule(stmt)?);
        }
        let count = parsed.len();
        let mut rules = self.rules.write().expect("rules lock poisoned");
        rules.extend(parsed);
        drop(rules);
        *self.cache.write().expect("cache lock poisoned") = None;
        debug!(added = count, "compiled new rule statements");
        Ok(count)
    }

    /// Evaluates a single goal and returns its bindings as rows. Wildcards
    /// have already been renamed to addressable `_0`, `_1`, … names by the
    /// parser, so every bound variable (wildcard or not) appears as a key.
    pub fn query(&self, goal_text: &str) -> Result<Vec<Row>, ReasonError> {
        let goal = parse_goal(goal_text)?;
        let facts = self.evaluate(&goal.predicate);
        let mut rows = Vec::new();
        for fact in &facts {
            if fact.args.len() != goal.args.len() {
                continue;
            }
            let mut row = Row::new();
            let mut ok = true;
            for (term, atom) in goal.args.iter().zip(fact.args.iter()) {
                match term {
                    Term::Var(name) => {
                        row.insert(name.clone(), atom.clone());
                    }
                    Term::Const(c) => {
                        if c != atom {
                            ok = false;
                            break;
                        }
                    }
                    Term::BinOp(..) => {
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// All derivable tuples of `predicate` (base ∪ derived), as plain
    /// facts rather than variable bindings.
    pub fn evaluate(&self, predicate: &str) -> Vec<Fact> {
        if native::is_complex_native(predicate) {
            let derived = self.derive_all();
            return native::evaluate_complex(predicate, &self.facts, &derived);
        }
        self.derive_all().remove(predicate).unwrap_or_default()
    }

    /// Runs the whole program (stdlib + any `add_rule` additions) to a
    /// fixpoint over the current fact-store snapshot, seeded with base
    /// facts and the cheap native predicates ([`native::NATIVE_PREDICATES`])
    /// that pure rules are allowed to join against (e.g. `login_succeeded`
    /// joining `current_url`).
    fn derive_all(&self) -> HashMap<String, Vec<Fact>> {
        let generation = self.facts.generation();
        if let Some(cache) = self.cache.read().expect("cache lock poisoned").as_ref() {
            if cache.generation == generation {
                return cache.by_predicate.clone();
            }
        }

        let mut by_predicate: HashMap<String, Vec<Fact>> = HashMap::new();
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

        for fact in self.facts.all() {
            let key = fact_key(&fact.predicate, &fact.args);
            if seen.insert(key) {
                by_predicate.entry(fact.predicate.clone()).or_default().push(fact);
            }
        }
        for predicate in native::NATIVE_PREDICATES {
            for fact in native::evaluate_simple(predicate, &self.facts) {
                let key = fact_key(&fact.predicate, &fact.args);
                if seen.insert(key) {
                    by_predicate.entry(fact.predicate.clone()).or_default().push(fact);
                }
            }
        }

        let rules = self.rules.read().expect("rules lock poisoned").clone();
        for _ in 0..MAX_FIXPOINT_ITERATIONS {
            let mut grew = false;
            for rule in &rules {
                for fact in apply_rule(rule, &by_predicate) {
                    let key = fact_key(&fact.predicate, &fact.args);
                    if seen.insert(key) {
                        by_predicate
                            .entry(fact.predicate.clone())
                            .or_default()
                            .push(fact);
                        grew = true;
                    }
                }
            }
            if !grew {
                break;
            }
        }

        trace!(predicates = by_predicate.len(), generation, "fixpoint settled");
        *self.cache.write().expect("cache lock poisoned") = Some(DerivationCache {
            generation,
            by_predicate: by_predicate.clone(),
        });
        by_predicate
    }
}

fn fact_key(predicate: &str, args: &[Atom]) -> String {
    let mut key = String::with_capacity(predicate.len() + args.len() * 8);
    key.push_str(predicate);
    for arg in args {
        key.push('\u{1}');
        key.push_str(&atom_key(arg));
    }
    key
}

fn atom_key(atom: &Atom) -> String {
    match atom {
        Atom::Str(s) => format!("s:{s}"),
        Atom::Int(i) => format!("i:{i}"),
        Atom::Float(f) => format!("f:{f}"),
        Atom::Bool(b) => format!("b:{b}"),
    }
}

/// One partial match of a rule body: the variable bindings accumulated so
/// far, plus the newest timestamp among the facts that contributed to it
/// (derived facts inherit the most recent contributing event's time).
#[derive(Clone, Default)]
struct Binding {
    vars: HashMap<String, Atom>,
    newest_ts: i64,
}

fn apply_rule(rule: &Rule, facts_by_pred: &HashMap<String, Vec<Fact>>) -> Vec<Fact> {
    let mut bindings = vec![Binding::default()];
    for term in &rule.body {
        if bindings.is_empty() {
            break;
        }
        bindings = match term {
            BodyTerm::Pred(lit) => join_literal(lit, &bindings, facts_by_pred),
            BodyTerm::Cmp(cmp) => bindings
                .into_iter()
                .filter_map(|b| apply_comparison(cmp, b))
                .collect(),
        };
    }

    bindings
        .into_iter()
        .filter_map(|b| project_head(&rule.head, &b))
        .collect()
}

fn join_literal(lit: &Literal, bindings: &[Binding], facts_by_pred: &HashMap<String, Vec<Fact>>) -> Vec<Binding> {
    let Some(candidates) = facts_by_pred.get(&lit.predicate) else {
        return Vec::new();
    };
    let mut next = Vec::new();
    for binding in bindings {
        for fact in candidates {
            if fact.args.len() != lit.args.len() {
                continue;
            }
            let mut extended = binding.clone();
            let mut ok = true;
            for (term, atom) in lit.args.iter().zip(fact.args.iter()) {
                match term {
                    Term::Var(name) => {
                        if let Some(existing) = extended.vars.get(name) {
                            if existing != atom {
                                ok = false;
                                break;
                            }
                        } else {
                            extended.vars.insert(name.clone(), atom.clone());
                        }
                    }
                    Term::Const(c) => {
                        if c != atom {
                            ok = false;
                            break;
                        }
                    }
                    Term::BinOp(..) => {
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                extended.newest_ts = extended.newest_ts.max(fact.timestamp);
                next.push(extended);
            }
        }
    }
    next
}

fn resolve_term(term: &Term, binding: &Binding) -> Option<Atom> {
    match term {
        Term::Var(name) => binding.vars.get(name).cloned(),
        Term::Const(atom) => Some(atom.clone()),
        Term::BinOp(left, op, right) => {
            let l = resolve_term(left, binding)?;
            let r = resolve_term(right, binding)?;
            apply_arith(*op, &l, &r)
        }
    }
}

fn apply_arith(op: ArithOp, left: &Atom, right: &Atom) -> Option<Atom> {
    let l = left.as_float()?;
    let r = right.as_float()?;
    let result = match op {
        ArithOp::Add => l + r,
        ArithOp::Sub => l - r,
    };
    if matches!(left, Atom::Int(_)) && matches!(right, Atom::Int(_)) {
        Some(Atom::Int(result as i64))
    } else {
        Some(Atom::Float(result))
    }
}

fn apply_comparison(cmp: &crate::types::Comparison, mut binding: Binding) -> Option<Binding> {
    if cmp.op == CompareOp::Eq {
        if let Term::Var(name) = &cmp.left {
            if !binding.vars.contains_key(name) {
                let value = resolve_term(&cmp.right, &binding)?;
                binding.vars.insert(name.clone(), value);
                return Some(binding);
            }
        }
    }
    let left = resolve_term(&cmp.left, &binding)?;
    let right = resolve_term(&cmp.right, &binding)?;
    let holds = match cmp.op {
        CompareOp::Eq => atoms_equal(&left, &right),
        CompareOp::Ne => !atoms_equal(&left, &right),
        CompareOp::Lt => compare_numeric(&left, &right)? == std::cmp::Ordering::Less,
        CompareOp::Gt => compare_numeric(&left, &right)? == std::cmp::Ordering::Greater,
        CompareOp::Ge => compare_numeric(&left, &right)? != std::cmp::Ordering::Less,
        CompareOp::Le => compare_numeric(&left, &right)? != std::cmp::Ordering::Greater,
    };
    holds.then_some(binding)
}

fn atoms_equal(a: &Atom, b: &Atom) -> bool {
    a == b
}

fn compare_numeric(a: &Atom, b: &Atom) -> Option<std::cmp::Ordering> {
    a.as_float()?.partial_cmp(&b.as_float()?)
}

fn project_head(head: &Literal, binding: &Binding) -> Option<Fact> {
    let mut args = Vec::with_capacity(head.args.len());
    for term in &head.args {
        args.push(resolve_term(term, binding)?);
    }
    Some(Fact::new(head.predicate.clone(), args, binding.newest_ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn engine_with(facts: Vec<Fact>) -> ReasoningEngine {
        let store = Arc::new(FactStore::new(10_000));
        store.push(facts);
        ReasoningEngine::new(store)
    }

    #[test]
    fn derives_failed_request_from_net_request_and_response() {
        let engine = engine_with(vec![
            Fact::new(
                "net_request",
                vec!["s".into(), "r1".into(), "GET".into(), "/api/x".into(), "fetch".into(), 1000.into()],
                1000,
            ),
            Fact::new(
                "net_response",
                vec!["s".into(), "r1".into(), 500.into(), 20.into(), 30.into()],
                1030,
            ),
        ]);
        let rows = engine.query("failed_request(S, Id, Url, Status)").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Status"], Atom::Int(500));
        assert_eq!(rows[0]["Url"], Atom::Str("/api/x".to_string()));
    }

    #[test]
    fn successful_response_does_not_derive_failed_request() {
        let engine = engine_with(vec![
            Fact::new(
                "net_request",
                vec!["s".into(), "r1".into(), "GET".into(), "/api/x".into(), "fetch".into(), 1000.into()],
                1000,
            ),
            Fact::new(
                "net_response",
                vec!["s".into(), "r1".into(), 200.into(), 20.into(), 30.into()],
                1030,
            ),
        ]);
        assert!(engine.evaluate("failed_request").is_empty());
    }

    #[test]
    fn slow_api_requires_duration_over_threshold() {
        let engine = engine_with(vec![
            Fact::new(
                "net_request",
                vec!["s".into(), "r1".into(), "GET".into(), "/api/x".into(), "fetch".into(), 1000.into()],
                1000,
            ),
            Fact::new(
                "net_response",
                vec!["s".into(), "r1".into(), 200.into(), 20.into(), 1500.into()],
                2500,
            ),
        ]);
        let rows = engine.query("slow_api(S, Id, Url, Duration)").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Duration"], Atom::Int(1500));
    }

    #[test]
    fn login_succeeded_when_url_changes_after_submit() {
        let engine = engine_with(vec![
            Fact::new("url_before_submit", vec!["s".into(), "https://x/login".into(), 100.into()], 100),
            Fact::new("navigation_event", vec!["s".into(), "https://x/dashboard".into()], 200),
        ]);
        let rows = engine.query("login_succeeded(S)").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["S"], Atom::Str("s".to_string()));
    }

    #[test]
    fn login_succeeded_absent_when_url_unchanged() {
        let engine = engine_with(vec![
            Fact::new("url_before_submit", vec!["s".into(), "https://x/login".into(), 100.into()], 100),
            Fact::new("navigation_event", vec!["s".into(), "https://x/login".into()], 200),
        ]);
        assert!(engine.evaluate("login_succeeded").is_empty());
    }

    #[test]
    fn cascading_failure_links_child_to_parent_via_initiator() {
        let engine = engine_with(vec![
            Fact::new(
                "net_request",
                vec!["s".into(), "parent".into(), "GET".into(), "/p".into(), "nav".into(), 100.into()],
                100,
            ),
            Fact::new(
                "net_response",
                vec!["s".into(), "parent".into(), 500.into(), 1.into(), 1.into()],
                101,
            ),
            Fact::new(
                "net_request",
                vec!["s".into(), "child".into(), "GET".into(), "/c".into(), "parent".into(), 110.into()],
                110,
            ),
            Fact::new(
                "net_response",
                vec!["s".into(), "child".into(), 502.into(), 1.into(), 1.into()],
                111,
            ),
        ]);
        let rows = engine.query("cascading_failure(S, Child, Parent)").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Child"], Atom::Str("child".to_string()));
        assert_eq!(rows[0]["Parent"], Atom::Str("parent".to_string()));
    }

    #[test]
    fn action_candidate_dedup_keeps_highest_priority_per_ref() {
        let engine = engine_with(vec![
            Fact::new(
                "interactive",
                vec!["s".into(), "btn-1".into(), "button".into(), "Save".into(), "click".into()],
                1,
            ),
            Fact::new("element_enabled", vec!["s".into(), "btn-1".into()], 1),
        ]);
        let rows = engine.query("action_candidate(S, Ref, Label, Action, Priority, Reason)").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Priority"], Atom::Int(80));
    }

    #[test]
    fn query_tolerates_missing_trailing_period() {
        let engine = engine_with(vec![]);
        assert_eq!(
            engine.query("failed_request(S, Id, Url, Status)").unwrap(),
            engine.query("failed_request(S, Id, Url, Status).").unwrap()
        );
    }

    #[test]
    fn add_rule_rejects_bad_syntax_and_leaves_program_unchanged() {
        let engine = engine_with(vec![]);
        let before = engine.query("failed_request(S, Id, Url, Status)").unwrap();
        assert!(engine.add_rule("not a rule").is_err());
        let after = engine.query("failed_request(S, Id, Url, Status)").unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn derivation_cache_reflects_facts_pushed_before_call_completes() {
        let store = Arc::new(FactStore::new(10_000));
        let engine = ReasoningEngine::new(store);
        assert!(engine.evaluate("failed_request").is_empty());
        engine.push_facts(vec![
            Fact::new(
                "net_request",
                vec!["s".into(), "r1".into(), "GET".into(), "/x".into(), "fetch".into(), 1.into()],
                1,
            ),
            Fact::new("net_response", vec!["s".into(), "r1".into(), 500.into(), 1.into(), 1.into()], 2),
        ]);
        assert_eq!(engine.evaluate("failed_request").len(), 1);
    }

    proptest::proptest! {
        #[test]
        fn query_is_deterministic_for_a_fixed_snapshot(n in 1usize..20) {
            let store = Arc::new(FactStore::new(10_000));
            for i in 0..n {
                store.push(vec![
                    Fact::new(
                        "net_request",
                        vec!["s".into(), format!("r{i}").into(), "GET".into(), "/x".into(), "fetch".into(), (i as i64).into()],
                        i as i64,
                    ),
                    Fact::new(
                        "net_response",
                        vec!["s".into(), format!("r{i}").into(), 500.into(), 1.into(), 1.into()],
                        i as i64,
                    ),
                ]);
            }
            let engine = ReasoningEngine::new(store);
            let first = engine.evaluate("failed_request");
            let second = engine.evaluate("failed_request");
            prop_assert_eq!(first.len(), second.len());
            prop_assert_eq!(first.len(), n);
        }
    }
}
