//! Map from stable `ref` to [`Fingerprint`], rewritten wholesale on each
//! bulk re-observation.
//!
//! Per the Open Question resolved in `DESIGN.md`: registry-shaped state
//! keeps only the newest fingerprint per ref (unlike the Fact Store, which
//! preserves every event-shaped fact). Individual entries are never
//! mutated in place — [`ElementRegistry::replace_all`] swaps the whole map
//! and bumps `generation` so refs minted under a stale generation are
//! caught by [`ElementRegistry::get`] rather than silently revalidated
//! against the wrong element.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::error::SessionError;
use crate::fingerprint::Fingerprint;

pub struct ElementRegistry {
    entries: DashMap<String, Fingerprint>,
    generation: AtomicU64,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Replaces the entire registry contents in one step and advances the
    /// generation counter. Every fingerprint in `entries` is stamped with
    /// the new generation id, overriding whatever it carried in.
    pub fn replace_all(&self, entries: Vec<(String, Fingerprint)>) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.entries.clear();
        for (ref_id, mut fp) in entries {
            fp.generation_id = generation;
            self.entries.insert(ref_id, fp);
        }
        self.entries.shrink_to_fit();
        generation
    }

    /// Looks up `ref_id`, failing with [`SessionError::StaleRef`] if it was
    /// minted under an older generation than `expected_generation`, or
    /// [`SessionError::ElementNotFound`] if it doesn't exist at all.
    pub fn get(&self, ref_id: &str, expected_generation: u64) -> Result<Fingerprint, SessionError> {
        let current = self.generation();
        match self.entries.get(ref_id) {
            Some(entry) if expected_generation == 0 || expected_generation == current => {
                Ok(entry.value().clone())
            }
            Some(_) => Err(SessionError::StaleRef {
                ref_id: ref_id.to_string(),
                expected_generation,
                actual_generation: current,
            }),
            None => Err(SessionError::ElementNotFound(ref_id.to_string())),
        }
    }

    /// Looks up `ref_id` without checking generation, for callers (like
    /// fingerprint re-validation) that only care whether a ref currently
    /// resolves to something.
    pub fn get_current(&self, ref_id: &str) -> Result<Fingerprint, SessionError> {
        self.entries
            .get(ref_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| SessionError::ElementNotFound(ref_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all(&self) -> Vec<(String, Fingerprint)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

impl Default for ElementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::BoundingBox;
    use chrono::Utc;

    fn fp(tag: &str) -> Fingerprint {
        Fingerprint {
            tag_name: tag.to_string(),
            id: None,
            name: None,
            aria_label: None,
            data_testid: None,
            role: None,
            classes: vec![],
            bounding_box: BoundingBox { x: 0.0, y: 0.0, width: 1.0, height: 1.0 },
            text_content: String::new(),
            alt_selectors: vec![],
            generated_at: Utc::now(),
            generation_id: 0,
        }
    }

    #[test]
    fn replace_all_advances_generation_and_stamps_entries() {
        let registry = ElementRegistry::new();
        let gen1 = registry.replace_all(vec![("btn-1".to_string(), fp("button"))]);
        assert_eq!(gen1, 1);
        let entry = registry.get("btn-1", gen1).unwrap();
        assert_eq!(entry.generation_id, gen1);
    }

    #[test]
    fn stale_ref_detected_after_re_registration() {
        let registry = ElementRegistry::new();
        let gen1 = registry.replace_all(vec![("btn-1".to_string(), fp("button"))]);
        registry.replace_all(vec![("btn-1".to_string(), fp("button"))]);
        let err = registry.get("btn-1", gen1).unwrap_err();
        assert!(matches!(err, SessionError::StaleRef { .. }));
    }

    #[test]
    fn missing_ref_is_element_not_found() {
        let registry = ElementRegistry::new();
        let err = registry.get("nope", 0).unwrap_err();
        assert!(matches!(err, SessionError::ElementNotFound(_)));
    }

    #[test]
    fn replace_all_drops_previous_generation_entries_entirely() {
        let registry = ElementRegistry::new();
        registry.replace_all(vec![("old".to_string(), fp("button"))]);
        registry.replace_all(vec![("new".to_string(), fp("a"))]);
        assert!(registry.get_current("old").is_err());
        assert!(registry.get_current("new").is_ok());
    }
}
