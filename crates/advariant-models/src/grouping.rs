//! Contiguous segment grouping.
//!
//! Consecutive segment ids such as `1, 2, 3` collapse into a single shot
//! group `(1, 3)`; the same applies to split segments (`4.2, 4.3, 4.4` ->
//! `(4.2, 4.4)`). A non-split segment can only absorb following split
//! segments when they enter at `n.1`: `1, 2, 3, 4.1, 4.2, 4.3, 5` yields
//! `[(1, 4.3), (5, 5)]` while `1, 2, 3, 4.2, 4.3, 4.4, 5` yields
//! `[(1, 3), (4.2, 4.4), (5, 5)]`. Out-of-order input is never reordered:
//! `5, 1, 2, 3` yields `[(5, 5), (1, 3)]`.

use crate::segment::SegmentId;

/// A maximal run of contiguous segment identifiers.
///
/// Derived from a variant's segment ordering, never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShotGroup {
    /// First segment id in the run.
    pub start_id: SegmentId,
    /// Last segment id in the run (equal to `start_id` for singletons).
    pub end_id: SegmentId,
}

impl ShotGroup {
    pub fn new(start_id: impl Into<SegmentId>, end_id: impl Into<SegmentId>) -> Self {
        Self {
            start_id: start_id.into(),
            end_id: end_id.into(),
        }
    }
}

/// Group an ordered segment-id sequence into minimal contiguous runs.
///
/// Scans left to right, greedily extending the current run while the
/// sequential-adjacency rule holds. Linear in the number of ids. The input
/// order is the variant's creative order and is preserved in the output.
pub fn group_consecutive_segments(ids: &[SegmentId]) -> Vec<ShotGroup> {
    let mut groups = Vec::new();
    let mut i = 0;
    while i < ids.len() {
        let mut j = i;
        while j + 1 < ids.len() && ids[j].is_sequential_successor(&ids[j + 1]) {
            j += 1;
        }
        groups.push(ShotGroup {
            start_id: ids[i].clone(),
            end_id: ids[j].clone(),
        });
        i = j + 1;
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<SegmentId> {
        raw.iter().map(|s| SegmentId::from(*s)).collect()
    }

    fn groups(raw: &[&str]) -> Vec<(String, String)> {
        group_consecutive_segments(&ids(raw))
            .into_iter()
            .map(|g| (g.start_id.0, g.end_id.0))
            .collect()
    }

    #[test]
    fn test_split_segments_entering_at_one_extend_group() {
        assert_eq!(
            groups(&["1", "2", "3", "4.1", "4.2", "4.3", "5"]),
            vec![
                ("1".to_string(), "4.3".to_string()),
                ("5".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_split_segments_entering_midway_break_group() {
        assert_eq!(
            groups(&["1", "2", "3", "4.2", "4.3", "4.4", "5"]),
            vec![
                ("1".to_string(), "3".to_string()),
                ("4.2".to_string(), "4.4".to_string()),
                ("5".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_unordered_input_is_not_reordered() {
        assert_eq!(
            groups(&["5", "1", "2", "3"]),
            vec![
                ("5".to_string(), "5".to_string()),
                ("1".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn test_single_segment() {
        assert_eq!(groups(&["7"]), vec![("7".to_string(), "7".to_string())]);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_consecutive_segments(&[]).is_empty());
    }

    #[test]
    fn test_every_id_lands_in_exactly_one_group() {
        let input = ids(&["2", "3", "4.1", "4.2", "9", "5", "6"]);
        let result = group_consecutive_segments(&input);

        // Walk the groups and re-collect the covered ids in order.
        let mut covered = Vec::new();
        let mut cursor = 0;
        for group in &result {
            assert_eq!(input[cursor], group.start_id);
            while input[cursor] != group.end_id {
                covered.push(input[cursor].clone());
                cursor += 1;
            }
            covered.push(input[cursor].clone());
            cursor += 1;
        }
        assert_eq!(covered, input);
    }

    #[test]
    fn test_group_bounds_are_members_of_input() {
        let input = ids(&["1", "2", "4.2", "4.3", "8"]);
        for group in group_consecutive_segments(&input) {
            assert!(input.contains(&group.start_id));
            assert!(input.contains(&group.end_id));
        }
    }
}
