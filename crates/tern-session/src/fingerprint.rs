//! Captured attributes of a DOM element, taken at observation time and
//! used to re-find and validate it later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A rectangle in viewport coordinates, captured alongside a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A snapshot of one interactive element's identifying attributes.
///
/// Rewritten wholesale on each bulk re-observation (see
/// [`crate::registry::ElementRegistry::replace_all`]); individual fields
/// are never patched in place, so a `Fingerprint` handed out by one
/// generation never silently changes under the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub tag_name: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub aria_label: Option<String>,
    pub data_testid: Option<String>,
    pub role: Option<String>,
    pub classes: Vec<String>,
    pub bounding_box: BoundingBox,
    pub text_content: String,
    pub alt_selectors: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub generation_id: u64,
}

/// Outcome of checking a stored fingerprint against a freshly observed one
/// for the same ref. Intentionally not pass/fail — callers decide whether
/// `score` below their own threshold is fatal (default: warn only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub valid: bool,
    pub changes: Vec<String>,
    /// 1.0 = identical on every compared attribute, down to 0.0.
    pub score: f64,
}

impl Fingerprint {
    /// Compares `self` (the stored fingerprint) against `observed` (a fresh
    /// one for the same ref) and reports what drifted. `tag_name` mismatch
    /// alone makes the whole comparison invalid; everything else only
    /// lowers `score`.
    pub fn diff(&self, observed: &Fingerprint) -> DriftReport {
        let mut changes = Vec::new();
        let mut matched = 0u32;
        let mut total = 0u32;

        let tag_matches = self.tag_name == observed.tag_name;
        if !tag_matches {
            changes.push(format!(
                "tag_name changed: {} -> {}",
                self.tag_name, observed.tag_name
            ));
        }

        total += 1;
        if self.text_content == observed.text_content {
            matched += 1;
        } else {
            changes.push("text_content changed".to_string());
        }

        total += 1;
        if self.id == observed.id {
            matched += 1;
        } else {
            changes.push("id changed".to_string());
        }

        total += 1;
        if self.classes == observed.classes {
            matched += 1;
        } else {
            changes.push("classes changed".to_string());
        }

        total += 1;
        if bounding_box_close(&self.bounding_box, &observed.bounding_box) {
            matched += 1;
        } else {
            changes.push("bounding_box drifted".to_string());
        }

        let score = if tag_matches {
            matched as f64 / total as f64
        } else {
            0.0
        };

        DriftReport {
            valid: tag_matches,
            changes,
            score,
        }
    }
}

/// Bounding boxes within 4px on every edge are considered unchanged; small
/// drift is normal from reflow and shouldn't itself count against score.
fn bounding_box_close(a: &BoundingBox, b: &BoundingBox) -> bool {
    const TOLERANCE: f64 = 4.0;
    (a.x - b.x).abs() <= TOLERANCE
        && (a.y - b.y).abs() <= TOLERANCE
        && (a.width - b.width).abs() <= TOLERANCE
        && (a.height - b.height).abs() <= TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(tag: &str, text: &str, bbox: BoundingBox) -> Fingerprint {
        Fingerprint {
            tag_name: tag.to_string(),
            id: None,
            name: None,
            aria_label: None,
            data_testid: None,
            role: None,
            classes: vec![],
            bounding_box: bbox,
            text_content: text.to_string(),
            alt_selectors: vec![],
            generated_at: Utc::now(),
            generation_id: 0,
        }
    }

    #[test]
    fn identical_fingerprints_score_one() {
        let bbox = BoundingBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0 };
        let a = fp("button", "Save", bbox);
        let b = fp("button", "Save", bbox);
        let report = a.diff(&b);
        assert!(report.valid);
        assert_eq!(report.score, 1.0);
        assert!(report.changes.is_empty());
    }

    #[test]
    fn tag_mismatch_is_invalid_regardless_of_other_fields() {
        let bbox = BoundingBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0 };
        let a = fp("button", "Save", bbox);
        let b = fp("a", "Save", bbox);
        let report = a.diff(&b);
        assert!(!report.valid);
        assert_eq!(report.score, 0.0);
    }

    #[test]
    fn minor_bounding_box_drift_within_tolerance_does_not_count() {
        let a = fp("button", "Save", BoundingBox { x: 10.0, y: 10.0, width: 80.0, height: 30.0 });
        let b = fp("button", "Save", BoundingBox { x: 11.0, y: 9.0, width: 80.0, height: 30.0 });
        let report = a.diff(&b);
        assert!(report.valid);
        assert_eq!(report.score, 1.0);
    }

    #[test]
    fn text_drift_lowers_score_but_stays_valid() {
        let bbox = BoundingBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0 };
        let a = fp("button", "Save", bbox);
        let b = fp("button", "Save draft", bbox);
        let report = a.diff(&b);
        assert!(report.valid);
        assert!(report.score < 1.0);
        assert!(report.changes.iter().any(|c| c.contains("text_content")));
    }
}
