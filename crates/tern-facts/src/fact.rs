//! The atom and fact value types shared by every predicate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single value carried as one position of a fact's argument tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Atom {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Atom {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Atom::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Atom::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Atom::Float(f) => Some(*f),
            Atom::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Atom::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Str(s) => write!(f, "{s}"),
            Atom::Int(i) => write!(f, "{i}"),
            Atom::Float(n) => write!(f, "{n}"),
            Atom::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Atom {
    fn from(s: &str) -> Self {
        Atom::Str(s.to_string())
    }
}
impl From<String> for Atom {
    fn from(s: String) -> Self {
        Atom::Str(s)
    }
}
impl From<i64> for Atom {
    fn from(i: i64) -> Self {
        Atom::Int(i)
    }
}
impl From<f64> for Atom {
    fn from(f: f64) -> Self {
        Atom::Float(f)
    }
}
impl From<bool> for Atom {
    fn from(b: bool) -> Self {
        Atom::Bool(b)
    }
}

/// An immutable, timestamped tuple under a named predicate.
///
/// Facts are value-equal by `(predicate, args)` — `timestamp` and `seq` are
/// metadata, not part of identity. `PartialEq` is derived field-by-field
/// deliberately omits a custom impl; callers who need value-equality should
/// compare `(f.predicate, f.args)` directly (see `FactStore::push` for the
/// one place that matters: deduplication is a policy decision, not an
/// `Eq` decision).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub predicate: String,
    pub args: Vec<Atom>,
    /// Event-time in epoch milliseconds, as supplied by the caller (EI
    /// handlers use the browser event's monotonic time; tools use the
    /// moment the side effect occurred).
    pub timestamp: i64,
    /// Monotonic sequence number assigned by the store on push. Not part of
    /// value identity; used only to preserve and assert insertion order.
    pub seq: u64,
}

impl Fact {
    pub fn new(predicate: impl Into<String>, args: Vec<Atom>, timestamp: i64) -> Self {
        Self {
            predicate: predicate.into(),
            args,
            timestamp,
            seq: 0,
        }
    }

    /// True if `(predicate, args)` match, ignoring timestamp and seq.
    pub fn same_value(&self, other: &Fact) -> bool {
        self.predicate == other.predicate && self.args == other.args
    }
}
