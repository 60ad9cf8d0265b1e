//! A/V segment identifiers and spans.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hierarchical segment identifier, a dot-separated sequence of integers
/// (`"3"`, `"4.2"`, `"4.2.1"`).
///
/// Identifiers are kept as strings on the wire; the numeric structure only
/// matters for sequential-adjacency checks during grouping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SegmentId(pub String);

impl SegmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The dot-separated parts of the identifier.
    pub fn parts(&self) -> Vec<&str> {
        self.0.split('.').collect()
    }

    /// Whether `next` directly follows this identifier.
    ///
    /// Two rules make a pair sequential:
    /// 1. Same depth, identical prefix, and the last part of `next` is the
    ///    last part of `self` plus one (`"4.2"` -> `"4.3"`).
    /// 2. `next` equals "increment the last part of `self`, then append
    ///    `.1`" (`"3"` -> `"4.1"`, `"4.1"` -> `"4.2.1"`).
    ///
    /// Everything else, including non-numeric parts, is non-sequential.
    pub fn is_sequential_successor(&self, next: &SegmentId) -> bool {
        let current_parts = self.parts();
        let next_parts = next.parts();

        let last_current: u64 = match current_parts.last().and_then(|p| p.parse().ok()) {
            Some(n) => n,
            None => return false,
        };

        // Rule 1: plain increment at the same depth.
        if current_parts.len() == next_parts.len()
            && current_parts[..current_parts.len() - 1] == next_parts[..next_parts.len() - 1]
        {
            if let Some(last_next) = next_parts.last().and_then(|p| p.parse::<u64>().ok()) {
                if last_next == last_current + 1 {
                    return true;
                }
            }
        }

        // Rule 2: step down into a new sub-level.
        let mut incremented: Vec<String> =
            current_parts.iter().map(|p| p.to_string()).collect();
        *incremented.last_mut().expect("parts is never empty") = (last_current + 1).to_string();
        let sub_level = format!("{}.1", incremented.join("."));

        next.0 == sub_level
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SegmentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One timestamped segment reference from the upstream catalog.
///
/// The catalog guarantees `end_s > start_s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// The id of the A/V segment.
    pub av_segment_id: SegmentId,
    /// Start time in seconds.
    pub start_s: f64,
    /// End time in seconds.
    pub end_s: f64,
}

impl Segment {
    pub fn new(id: impl Into<SegmentId>, start_s: f64, end_s: f64) -> Self {
        Self {
            av_segment_id: id.into(),
            start_s,
            end_s,
        }
    }

    /// Span length in seconds.
    pub fn duration(&self) -> f64 {
        self.end_s - self.start_s
    }
}

impl From<String> for SegmentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_increment_is_sequential() {
        assert!(SegmentId::from("1").is_sequential_successor(&"2".into()));
        assert!(SegmentId::from("4.2").is_sequential_successor(&"4.3".into()));
        assert!(SegmentId::from("4.2.1").is_sequential_successor(&"4.2.2".into()));
    }

    #[test]
    fn test_sub_level_step_is_sequential() {
        assert!(SegmentId::from("3").is_sequential_successor(&"4.1".into()));
        assert!(SegmentId::from("4.1").is_sequential_successor(&"4.2.1".into()));
    }

    #[test]
    fn test_non_sequential_pairs() {
        assert!(!SegmentId::from("5").is_sequential_successor(&"1".into()));
        assert!(!SegmentId::from("3").is_sequential_successor(&"4.2".into()));
        assert!(!SegmentId::from("4.2").is_sequential_successor(&"5".into()));
        assert!(!SegmentId::from("1").is_sequential_successor(&"1".into()));
        assert!(!SegmentId::from("2").is_sequential_successor(&"2.1".into()));
    }

    #[test]
    fn test_non_numeric_parts_never_match() {
        assert!(!SegmentId::from("a").is_sequential_successor(&"b".into()));
        assert!(!SegmentId::from("1").is_sequential_successor(&"x.1".into()));
        assert!(!SegmentId::from("intro").is_sequential_successor(&"2".into()));
    }

    #[test]
    fn test_segment_duration() {
        let seg = Segment::new("1", 2.5, 7.0);
        assert!((seg.duration() - 4.5).abs() < f64::EPSILON);
    }
}
