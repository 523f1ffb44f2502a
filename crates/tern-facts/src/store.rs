//! The ring-buffered append log.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{trace, warn};

use crate::fact::Fact;

const DEFAULT_CAPACITY: usize = 10_000;

/// Temporal fact store: a bounded, append-only log of facts indexed by
/// predicate name and by `(predicate, first-arg)`.
///
/// Held behind a single `RwLock` over the whole ring — pushes take the write
/// half, every read takes the read half and clones out what it needs before
/// releasing the lock, so callers never see a live backing array and a read
/// that overlaps a push sees either all of the push's facts or none of them.
///
/// `generation` is bumped on every push and is read by `tern-reason` to
/// decide whether a cached derivation is stale, mirroring the
/// generation-counter pattern used for cache invalidation elsewhere in this
/// codebase.
pub struct FactStore {
    inner: RwLock<Inner>,
    capacity: usize,
    next_seq: AtomicU64,
    generation: AtomicU64,
    overflow_count: AtomicU64,
}

struct Inner {
    /// Global insertion-ordered ring, oldest first.
    ring: VecDeque<Arc<Fact>>,
    by_predicate: HashMap<String, VecDeque<Arc<Fact>>>,
    by_predicate_and_key: HashMap<(String, String), VecDeque<Arc<Fact>>>,
}

impl FactStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                ring: VecDeque::new(),
                by_predicate: HashMap::new(),
                by_predicate_and_key: HashMap::new(),
            }),
            capacity: capacity.max(1),
            next_seq: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            overflow_count: AtomicU64::new(0),
        }
    }

    /// Current invalidation generation. Bumped once per `push` call that
    /// accepts at least one fact.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Appends `facts`, assigning each a fresh sequence number, evicting the
    /// oldest entries if capacity is exceeded. Never fails; returns the
    /// number of facts accepted (always `facts.len()` — overflow evicts the
    /// tail, it does not reject the head).
    pub fn push(&self, facts: Vec<Fact>) -> usize {
        if facts.is_empty() {
            return 0;
        }
        let accepted = facts.len();
        let mut inner = self.inner.write().expect("fact store lock poisoned");
        for mut fact in facts {
            fact.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            let fact = Arc::new(fact);
            inner.ring.push_back(fact.clone());
            inner
                .by_predicate
                .entry(fact.predicate.clone())
                .or_default()
                .push_back(fact.clone());
            if let Some(first) = fact.args.first().and_then(|a| a.as_str()) {
                inner
                    .by_predicate_and_key
                    .entry((fact.predicate.clone(), first.to_string()))
                    .or_default()
                    .push_back(fact.clone());
            }
        }
        while inner.ring.len() > self.capacity {
            if let Some(evicted) = inner.ring.pop_front() {
                if let Some(q) = inner.by_predicate.get_mut(&evicted.predicate) {
                    q.pop_front();
                }
                if let Some(first) = evicted.args.first().and_then(|a| a.as_str()) {
                    if let Some(q) = inner
                        .by_predicate_and_key
                        .get_mut(&(evicted.predicate.clone(), first.to_string()))
                    {
                        q.pop_front();
                    }
                }
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                trace!(predicate = %evicted.predicate, "evicted oldest fact on overflow");
            }
        }
        drop(inner);
        self.generation.fetch_add(1, Ordering::AcqRel);
        accepted
    }

    /// All live facts for `predicate`, in insertion order.
    pub fn by_predicate(&self, predicate: &str) -> Vec<Fact> {
        let inner = self.inner.read().expect("fact store lock poisoned");
        inner
            .by_predicate
            .get(predicate)
            .map(|q| q.iter().map(|f| (**f).clone()).collect())
            .unwrap_or_default()
    }

    /// All live facts for `predicate` whose first argument is `key`, in
    /// insertion order. A fast path for the common `(predicate, session_id)`
    /// query shape.
    pub fn by_predicate_and_key(&self, predicate: &str, key: &str) -> Vec<Fact> {
        let inner = self.inner.read().expect("fact store lock poisoned");
        inner
            .by_predicate_and_key
            .get(&(predicate.to_string(), key.to_string()))
            .map(|q| q.iter().map(|f| (**f).clone()).collect())
            .unwrap_or_default()
    }

    /// Facts for `predicate` with `after_ms <= timestamp < before_ms`
    /// (half-open when both bounds are given; single-bounded otherwise).
    pub fn temporal(
        &self,
        predicate: &str,
        after_ms: Option<i64>,
        before_ms: Option<i64>,
    ) -> Vec<Fact> {
        if let (Some(after), Some(before)) = (after_ms, before_ms) {
            if before <= after {
                return Vec::new();
            }
        }
        self.by_predicate(predicate)
            .into_iter()
            .filter(|f| {
                after_ms.is_none_or(|a| f.timestamp >= a)
                    && before_ms.is_none_or(|b| f.timestamp < b)
            })
            .collect()
    }

    /// Snapshot of every live fact. Order is unspecified beyond "newest
    /// first is acceptable" per the contract; we return newest-first.
    pub fn all(&self) -> Vec<Fact> {
        let inner = self.inner.read().expect("fact store lock poisoned");
        inner.ring.iter().rev().map(|f| (**f).clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("fact store lock poisoned").ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }
}

impl Default for FactStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Logs and drops a fact whose arity does not match what has already been
/// observed for its predicate. Called by ingestion/tool code before
/// `push`, never by the store itself (the store has no notion of expected
/// arity, only of what's been pushed so far).
pub fn check_arity(expected: &HashMap<String, usize>, fact: &Fact) -> bool {
    match expected.get(&fact.predicate) {
        Some(&n) if n != fact.args.len() => {
            warn!(
                predicate = %fact.predicate,
                expected = n,
                actual = fact.args.len(),
                "dropping fact with mismatched arity"
            );
            false
        }
        _ => true,
    }
}
