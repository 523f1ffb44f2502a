//! Rule and goal AST shared by the parser and the evaluator.

use tern_facts::Atom;

/// A value slot in a rule or goal: a variable to bind, a wildcard (already
/// normalised to a unique `_0`, `_1`, … name by the parser), or a literal
/// constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Var(String),
    Const(Atom),
    /// `left <op> right`, valid only on the right-hand side of a
    /// `Comparison` — the small amount of arithmetic the reasoning engine
    /// needs to express temporal-proximity windows (`toast_after_api_failure`)
    /// and duration math without a general expression language.
    BinOp(Box<Term>, ArithOp, Box<Term>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
}

impl Term {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Term::Var(v) if v.starts_with('_') && v[1..].chars().all(|c| c.is_ascii_digit()) && v.len() > 1)
    }
}

/// A predicate call: `name(arg, arg, ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub predicate: String,
    pub args: Vec<Term>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Ge,
    Le,
}

/// A comparison or binding built-in in a rule body: `Left <op> Right`.
/// When `op` is `Eq` and `Left` is an unbound variable, this acts as an
/// assignment once `Right` is grounded — the mechanism `root_cause` and
/// `global_action` use to project constants and renamed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub op: CompareOp,
    pub left: Term,
    pub right: Term,
}

/// One literal in a rule body: either a predicate call to join against, or
/// a built-in comparison/assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyTerm {
    Pred(Literal),
    Cmp(Comparison),
}

/// `head :- body_1, body_2, ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub head: Literal,
    pub body: Vec<BodyTerm>,
}

impl Rule {
    pub fn head_predicate(&self) -> &str {
        &self.head.predicate
    }
}

/// A single goal parsed from `query(goal_text)`: a predicate call whose
/// unbound variables become the columns of the result rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Goal {
    pub predicate: String,
    pub args: Vec<Term>,
}

/// One row of a query result: variable name to bound atom. Wildcards never
/// appear as keys.
pub type Row = std::collections::BTreeMap<String, Atom>;
