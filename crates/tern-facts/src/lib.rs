//! Temporal fact store.
//!
//! A bounded, append-only log of `(predicate, args, timestamp)` tuples,
//! indexed for the two access patterns the rest of the system needs: "all
//! facts under this predicate" and "all facts under this predicate for this
//! session". Everything above this crate — the reasoning engine, the event
//! ingestor, the progressive tools — treats it as the single source of
//! truth for what has happened so far.

mod error;
mod fact;
mod store;

pub use error::FactsError;
pub use fact::{Atom, Fact};
pub use store::{check_arity, FactStore};

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn f(pred: &str, args: Vec<Atom>, ts: i64) -> Fact {
        Fact::new(pred, args, ts)
    }

    #[test]
    fn push_assigns_increasing_sequence_numbers() {
        let store = FactStore::new(100);
        store.push(vec![
            f("net_request", vec!["s".into(), "r1".into()], 1),
            f("net_request", vec!["s".into(), "r2".into()], 2),
        ]);
        let facts = store.by_predicate("net_request");
        assert_eq!(facts.len(), 2);
        assert!(facts[0].seq < facts[1].seq);
    }

    #[test]
    fn by_predicate_preserves_insertion_order() {
        let store = FactStore::new(100);
        for i in 0..5 {
            store.push(vec![f("console_event", vec![Atom::Int(i)], i)]);
        }
        let facts = store.by_predicate("console_event");
        let seqs: Vec<u64> = facts.iter().map(|f| f.seq).collect();
        let mut sorted = seqs.clone();
        sorted.sort();
        assert_eq!(seqs, sorted);
    }

    #[test]
    fn capacity_bound_holds_after_overflow() {
        let store = FactStore::new(10);
        for i in 0..100 {
            store.push(vec![f("tick", vec![Atom::Int(i)], i)]);
        }
        assert_eq!(store.len(), 10);
        assert!(store.all().len() <= store.capacity());
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let store = FactStore::new(3);
        store.push(vec![f("p", vec![Atom::Int(1)], 1)]);
        store.push(vec![f("p", vec![Atom::Int(2)], 2)]);
        store.push(vec![f("p", vec![Atom::Int(3)], 3)]);
        store.push(vec![f("p", vec![Atom::Int(4)], 4)]);
        let remaining: Vec<i64> = store
            .by_predicate("p")
            .into_iter()
            .map(|f| f.args[0].as_int().unwrap())
            .collect();
        assert_eq!(remaining, vec![2, 3, 4]);
    }

    #[test]
    fn temporal_half_open_window() {
        let store = FactStore::new(100);
        store.push(vec![
            f("net_response", vec!["s".into()], 100),
            f("net_response", vec!["s".into()], 200),
            f("net_response", vec!["s".into()], 300),
        ]);
        let rows = store.temporal("net_response", Some(100), Some(300));
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|f| f.timestamp >= 100 && f.timestamp < 300));
    }

    #[test]
    fn temporal_empty_window_yields_nothing() {
        let store = FactStore::new(100);
        store.push(vec![f("p", vec![], 50)]);
        assert!(store.temporal("p", Some(300), Some(100)).is_empty());
    }

    #[test]
    fn by_predicate_and_key_is_scoped_to_session() {
        let store = FactStore::new(100);
        store.push(vec![
            f("net_request", vec!["s1".into(), "r1".into()], 1),
            f("net_request", vec!["s2".into(), "r2".into()], 2),
        ]);
        let rows = store.by_predicate_and_key("net_request", "s1");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].args[1].as_str(), Some("r1"));
    }

    #[test]
    fn duplicates_are_not_collapsed_by_default() {
        let store = FactStore::new(100);
        store.push(vec![f("interactive", vec!["s".into(), "btn-1".into()], 1)]);
        store.push(vec![f("interactive", vec!["s".into(), "btn-1".into()], 2)]);
        assert_eq!(store.by_predicate("interactive").len(), 2);
    }

    #[test]
    fn generation_advances_on_push() {
        let store = FactStore::new(100);
        let g0 = store.generation();
        store.push(vec![f("p", vec![], 1)]);
        assert!(store.generation() > g0);
    }

    proptest::proptest! {
        #[test]
        fn capacity_bound_property(n in 0usize..500, cap in 1usize..50) {
            let store = FactStore::new(cap);
            for i in 0..n {
                store.push(vec![f("p", vec![Atom::Int(i as i64)], i as i64)]);
            }
            prop_assert!(store.all().len() <= cap);
        }

        #[test]
        fn by_predicate_sequence_is_nondecreasing(n in 0usize..200) {
            let store = FactStore::new(10_000);
            for i in 0..n {
                store.push(vec![f("p", vec![Atom::Int(i as i64)], i as i64)]);
            }
            let seqs: Vec<u64> = store.by_predicate("p").iter().map(|f| f.seq).collect();
            for w in seqs.windows(2) {
                prop_assert!(w[0] <= w[1]);
            }
        }
    }
}
