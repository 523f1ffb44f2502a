//! Tolerant hand-written parser for rule and goal text.
//!
//! Grammar is deliberately small: a literal is `name(arg, arg, ...)`, a rule
//! is `head :- body_1, body_2, ...`, a goal is a single literal. Splitting
//! is done at top level only (depth 0 outside `()`/`""`) so arguments that
//! are themselves quoted strings containing commas or parens are not
//! mis-split.

use crate::error::ReasonError;
use crate::types::{ArithOp, BodyTerm, CompareOp, Comparison, Goal, Literal, Rule, Term};
use tern_facts::Atom;

/// Splits `s` on `sep` at paren-depth 0, outside double-quoted spans.
/// Empty input yields an empty vec (not a single empty-string entry).
fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut current = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '(' if !in_quotes => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_quotes => {
                depth -= 1;
                current.push(c);
            }
            c if c == sep && depth == 0 && !in_quotes => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }
    parts
}

/// Finds the start index of a top-level (depth 0, outside quotes) `needle`.
fn find_top_level(s: &str, needle: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let needle_bytes = needle.as_bytes();
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_quotes = !in_quotes,
            b'(' if !in_quotes => depth += 1,
            b')' if !in_quotes => depth -= 1,
            _ => {}
        }
        if !in_quotes && depth == 0 && bytes[i..].starts_with(needle_bytes) {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn parse_simple_term(s: &str, wildcards: &mut usize) -> Result<Term, ReasonError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ReasonError::parse("expected a term, found nothing"));
    }
    if s == "_" {
        let name = format!("_{wildcards}");
        *wildcards += 1;
        return Ok(Term::Var(name));
    }
    if s.starts_with('"') && s.ends_with('"') && s.len() >= 2 {
        return Ok(Term::Const(Atom::Str(s[1..s.len() - 1].to_string())));
    }
    if s == "true" {
        return Ok(Term::Const(Atom::Bool(true)));
    }
    if s == "false" {
        return Ok(Term::Const(Atom::Bool(false)));
    }
    if let Ok(i) = s.parse::<i64>() {
        return Ok(Term::Const(Atom::Int(i)));
    }
    if let Ok(f) = s.parse::<f64>() {
        return Ok(Term::Const(Atom::Float(f)));
    }
    let first = s.chars().next().unwrap();
    if !(first.is_alphabetic() || first == '_') {
        return Err(ReasonError::parse(format!("invalid term: {s}")));
    }
    Ok(Term::Var(s.to_string()))
}

/// Parses a term, allowing one level of `left + right` / `left - right`
/// arithmetic (used on the right-hand side of comparisons).
fn parse_term(s: &str, wildcards: &mut usize) -> Result<Term, ReasonError> {
    let s = s.trim();
    for (op_str, op) in [(" + ", ArithOp::Add), (" - ", ArithOp::Sub)] {
        if let Some(idx) = find_top_level(s, op_str) {
            let left = parse_simple_term(&s[..idx], wildcards)?;
            let right = parse_simple_term(&s[idx + op_str.len()..], wildcards)?;
            return Ok(Term::BinOp(Box::new(left), op, Box::new(right)));
        }
    }
    parse_simple_term(s, wildcards)
}

fn parse_args(args_str: &str, wildcards: &mut usize) -> Result<Vec<Term>, ReasonError> {
    let args_str = args_str.trim();
    if args_str.is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(args_str, ',')
        .into_iter()
        .map(|a| parse_term(&a, wildcards))
        .collect()
}

/// Parses `name(arg, arg, ...)`, tolerating empty parens.
pub fn parse_literal(s: &str, wildcards: &mut usize) -> Result<Literal, ReasonError> {
    let s = s.trim();
    let open = s
        .find('(')
        .ok_or_else(|| ReasonError::parse(format!("expected '(' in literal: {s}")))?;
    if !s.ends_with(')') {
        return Err(ReasonError::parse(format!("expected ')' in literal: {s}")));
    }
    let name = s[..open].trim();
    if name.is_empty() {
        return Err(ReasonError::parse("predicate name cannot be empty"));
    }
    let inner = &s[open + 1..s.len() - 1];
    let args = parse_args(inner, wildcards)?;
    Ok(Literal {
        predicate: name.to_string(),
        args,
    })
}

const COMPARE_OPS: &[(&str, CompareOp)] = &[
    ("!=", CompareOp::Ne),
    (">=", CompareOp::Ge),
    ("<=", CompareOp::Le),
    ("=", CompareOp::Eq),
    ("<", CompareOp::Lt),
    (">", CompareOp::Gt),
];

fn parse_body_term(s: &str, wildcards: &mut usize) -> Result<BodyTerm, ReasonError> {
    let s = s.trim();
    for (op_str, op) in COMPARE_OPS {
        if let Some(idx) = find_top_level(s, op_str) {
            // Don't mistake the `(`-free comparison for part of a literal's
            // argument list: a literal always has '(' before any comparator
            // we'd find at top level, so if '(' appears before idx this
            // is not a comparison at the clause's outer level.
            if s[..idx].contains('(') && !s[..idx].contains(')') {
                continue;
            }
            let left = parse_term(&s[..idx], wildcards)?;
            let right = parse_term(&s[idx + op_str.len()..], wildcards)?;
            return Ok(BodyTerm::Cmp(Comparison {
                op: *op,
                left,
                right,
            }));
        }
    }
    Ok(BodyTerm::Pred(parse_literal(s, wildcards)?))
}

fn parse_body(body_str: &str, wildcards: &mut usize) -> Result<Vec<BodyTerm>, ReasonError> {
    split_top_level(body_str, ',')
        .into_iter()
        .map(|t| parse_body_term(&t, wildcards))
        .collect()
}

fn strip_trailing_period(s: &str) -> &str {
    let s = s.trim();
    s.strip_suffix('.').unwrap_or(s).trim()
}

/// Parses one `head :- body_1, body_2, ....` statement. A missing trailing
/// period is tolerated.
pub fn parse_rule(text: &str) -> Result<Rule, ReasonError> {
    let text = strip_trailing_period(text);
    let sep = find_top_level(text, ":-")
        .ok_or_else(|| ReasonError::parse("rule is missing ':-'"))?;
    let head_part = &text[..sep];
    let body_part = &text[sep + 2..];
    let mut wildcards = 0usize;
    let head = parse_literal(head_part, &mut wildcards)?;
    if body_part.trim().is_empty() {
        return Err(ReasonError::parse("rule body cannot be empty"));
    }
    let body = parse_body(body_part, &mut wildcards)?;
    Ok(Rule { head, body })
}

/// Parses a single goal: a predicate call with variables, constants, or
/// wildcards. A missing trailing period is tolerated; anonymous `_`
/// wildcards are renamed deterministically to `_0`, `_1`, ….
pub fn parse_goal(text: &str) -> Result<Goal, ReasonError> {
    let text = strip_trailing_period(text);
    let mut wildcards = 0usize;
    let lit = parse_literal(text, &mut wildcards)?;
    Ok(Goal {
        predicate: lit.predicate,
        args: lit.args,
    })
}

/// Splits a whole rule-program text (as loaded from `mangle.schema_path`)
/// into individual statements, skipping blank lines and `//` comments.
pub fn split_statements(source: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    for raw_line in source.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        current.push_str(raw_line);
        current.push(' ');
        if line.ends_with('.') {
            statements.push(current.trim().to_string());
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        statements.push(current.trim().to_string());
    }
    statements
}
