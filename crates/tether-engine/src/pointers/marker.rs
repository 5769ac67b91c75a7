//! The unit of range reconciliation: a mutable `(start, end, greedy)`
//! marker and the pure function that carries it across one document event.
//!
//! Boundary policy:
//! - text inserted strictly before a marker shifts both endpoints;
//!   strictly after leaves it untouched;
//! - an insertion exactly at a boundary is absorbed only by a greedy
//!   endpoint; a non-greedy endpoint shifts past it (start) or stays (end);
//! - a deletion strictly containing the marker invalidates it, unless the
//!   event qualifies as a whole-document replace and the marker is flagged
//!   to survive those.

use crate::host::DocEvent;
use crate::pointers::range::TextRange;

/// A range being tracked through edits. Infos sharing the same
/// `(start, end, greedy)` triple at cache-build time share one instance.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ManualMarker {
    pub start: usize,
    pub end: usize,
    pub greedy_left: bool,
    pub greedy_right: bool,
    pub survives_whole_replace: bool,
}

impl ManualMarker {
    pub fn new(range: TextRange, greedy_left: bool, greedy_right: bool) -> Self {
        Self {
            start: range.start,
            end: range.end,
            greedy_left,
            greedy_right,
            survives_whole_replace: false,
        }
    }

    pub fn surviving(mut self) -> Self {
        self.survives_whole_replace = true;
        self
    }

    pub fn range(&self) -> TextRange {
        TextRange::new(self.start, self.end)
    }

    /// The marker's range after `ev`, or `None` when the event consumed it.
    ///
    /// `prior_len` is the document length before the event; it feeds the
    /// whole-document-replace heuristic.
    pub fn updated_range(&self, ev: &DocEvent, prior_len: usize) -> Option<TextRange> {
        if is_whole_document_replace(ev, prior_len) {
            if !self.survives_whole_replace {
                return None;
            }
            // Keep the relative position, clamped into the new text.
            let new_len = ev.new_len();
            let start = self.start.min(new_len);
            let end = self.end.min(new_len).max(start);
            return Some(TextRange::new(start, end));
        }
        if self.start == self.end {
            return self.update_point(ev);
        }

        let offset = ev.offset;
        let old_end = ev.old_end();
        let new_len = ev.new_len();
        let grows_by = new_len as isize - ev.old_len as isize;

        // Event entirely after the marker; a non-greedy end ignores an
        // insertion sitting exactly on it.
        if self.end < offset || (!self.greedy_right && self.end == offset) {
            return Some(self.range());
        }
        // Event entirely before the marker; a non-greedy start is pushed
        // along rather than extended.
        if self.start > old_end || (!self.greedy_left && self.start == old_end) {
            return Some(TextRange::new(
                shift(self.start, grows_by),
                shift(self.end, grows_by),
            ));
        }
        // Replaced span inside the marker (boundaries included): the
        // marker stretches or shrinks around it.
        if self.start <= offset && self.end >= old_end {
            return Some(TextRange::new(self.start, shift(self.end, grows_by)));
        }
        // Marker prefix replaced: the start snaps to the end of the
        // inserted text.
        if self.start >= offset && self.start <= old_end && self.end > old_end {
            return Some(TextRange::new(offset + new_len, shift(self.end, grows_by)));
        }
        // Marker suffix replaced: the end snaps back to the event offset.
        if self.end >= offset && self.end <= old_end && self.start < offset {
            return Some(TextRange::new(self.start, offset));
        }
        // Strictly containing replacement: nothing of the marker survives.
        None
    }

    /// Zero-width markers: a single point is simultaneously a left and a
    /// right boundary, so it only expands when greedy on both sides.
    fn update_point(&self, ev: &DocEvent) -> Option<TextRange> {
        let p = self.start;
        let offset = ev.offset;
        let old_end = ev.old_end();
        if offset < p && p < old_end {
            return None;
        }
        if offset == p && ev.old_len == 0 && self.greedy_left && self.greedy_right {
            return Some(TextRange::new(p, p + ev.new_len()));
        }
        let moved = if p <= offset {
            p
        } else {
            p - ev.old_len + ev.new_len()
        };
        Some(TextRange::empty(moved))
    }
}

/// Whole-document-replace detection. The offset/length check is a
/// structural heuristic, not a guaranteed signal: a small document fully
/// retyped takes the same path as an external reload. Downstream
/// survive/invalidate semantics depend on this exact condition.
pub(crate) fn is_whole_document_replace(ev: &DocEvent, prior_len: usize) -> bool {
    ev.whole_document_replaced || (ev.offset == 0 && ev.old_len == prior_len)
}

fn shift(offset: usize, by: isize) -> usize {
    debug_assert!(offset as isize + by >= 0, "marker shifted below zero");
    (offset as isize + by) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DOC_LEN: usize = 100;

    fn marker(start: usize, end: usize) -> ManualMarker {
        ManualMarker::new(TextRange::new(start, end), false, false)
    }

    fn greedy(start: usize, end: usize, left: bool, right: bool) -> ManualMarker {
        ManualMarker::new(TextRange::new(start, end), left, right)
    }

    fn insert(at: usize, len: usize) -> DocEvent {
        DocEvent::replace(at, 0, "x".repeat(len))
    }

    fn delete(at: usize, len: usize) -> DocEvent {
        DocEvent::replace(at, len, "")
    }

    #[test]
    fn insert_strictly_before_shifts_both_endpoints() {
        let m = marker(10, 20);
        let r = m.updated_range(&insert(5, 3), DOC_LEN).unwrap();
        assert_eq!(r, TextRange::new(13, 23));
    }

    #[test]
    fn insert_strictly_after_leaves_range_unchanged() {
        let m = marker(10, 20);
        let r = m.updated_range(&insert(25, 3), DOC_LEN).unwrap();
        assert_eq!(r, TextRange::new(10, 20));
    }

    // Document "abcdef", non-greedy [2,4), insert "XYZ" at 2. The
    // insertion sits exactly on the non-greedy start boundary, so the
    // marker is shifted, not extended.
    #[test]
    fn non_greedy_start_boundary_insertion_shifts() {
        let m = marker(2, 4);
        let ev = DocEvent::replace(2, 0, "XYZ");
        let r = m.updated_range(&ev, 6).unwrap();
        assert_eq!(r, TextRange::new(5, 7));
    }

    #[rstest]
    // insertion exactly at start: greedy-left absorbs, non-greedy shifts
    #[case(greedy(10, 20, true, false), insert(10, 3), TextRange::new(10, 23))]
    #[case(greedy(10, 20, false, false), insert(10, 3), TextRange::new(13, 23))]
    // insertion exactly at end: greedy-right absorbs, non-greedy stays
    #[case(greedy(10, 20, false, true), insert(20, 3), TextRange::new(10, 23))]
    #[case(greedy(10, 20, false, false), insert(20, 3), TextRange::new(10, 20))]
    fn greedy_boundary_law(
        #[case] m: ManualMarker,
        #[case] ev: DocEvent,
        #[case] expected: TextRange,
    ) {
        assert_eq!(m.updated_range(&ev, DOC_LEN).unwrap(), expected);
    }

    #[test]
    fn deletion_inside_marker_shrinks_it() {
        let m = marker(10, 20);
        let r = m.updated_range(&delete(12, 4), DOC_LEN).unwrap();
        assert_eq!(r, TextRange::new(10, 16));
    }

    #[test]
    fn deletion_of_prefix_snaps_start() {
        let m = marker(10, 20);
        let r = m.updated_range(&delete(8, 5), DOC_LEN).unwrap();
        assert_eq!(r, TextRange::new(8, 15));
    }

    #[test]
    fn deletion_of_suffix_snaps_end() {
        let m = marker(10, 20);
        let r = m.updated_range(&delete(15, 10), DOC_LEN).unwrap();
        assert_eq!(r, TextRange::new(10, 15));
    }

    #[test]
    fn strictly_containing_deletion_invalidates() {
        let m = marker(10, 20);
        assert_eq!(m.updated_range(&delete(5, 20), DOC_LEN), None);
    }

    #[test]
    fn containing_replacement_invalidates_too() {
        let m = marker(10, 20);
        let ev = DocEvent::replace(9, 12, "abc");
        assert_eq!(m.updated_range(&ev, DOC_LEN), None);
    }

    #[test]
    fn exactly_equal_deletion_collapses_instead_of_invalidating() {
        let m = marker(10, 20);
        let r = m.updated_range(&delete(10, 10), DOC_LEN).unwrap();
        assert_eq!(r, TextRange::new(10, 10));
    }

    #[test]
    fn whole_replace_invalidates_non_surviving_marker() {
        let m = marker(2, 4);
        let ev = DocEvent::replace(0, 6, "completely different");
        assert_eq!(m.updated_range(&ev, 6), None);
    }

    #[test]
    fn whole_replace_keeps_surviving_marker_clamped() {
        let m = marker(2, 4).surviving();
        let ev = DocEvent::replace(0, 6, "abc");
        let r = m.updated_range(&ev, 6).unwrap();
        assert_eq!(r, TextRange::new(2, 3));
    }

    #[test]
    fn flagged_whole_replace_detected_regardless_of_shape() {
        let mut ev = DocEvent::replace(3, 2, "zz");
        ev.whole_document_replaced = true;
        assert!(is_whole_document_replace(&ev, DOC_LEN));
    }

    // The heuristic fires for any replacement of the full text from offset
    // zero; a small document retyped in one event is indistinguishable
    // from an external reload. Preserved intentionally.
    #[test]
    fn heuristic_fires_on_full_span_replacement() {
        let ev = DocEvent::replace(0, 6, "retyped");
        assert!(is_whole_document_replace(&ev, 6));
        assert!(!is_whole_document_replace(&ev, 7));
    }

    #[test]
    fn point_marker_moves_with_edits() {
        let m = marker(10, 10);
        assert_eq!(
            m.updated_range(&insert(5, 3), DOC_LEN).unwrap(),
            TextRange::empty(13)
        );
        assert_eq!(
            m.updated_range(&insert(15, 3), DOC_LEN).unwrap(),
            TextRange::empty(10)
        );
        assert_eq!(
            m.updated_range(&insert(10, 3), DOC_LEN).unwrap(),
            TextRange::empty(10)
        );
    }

    #[test]
    fn point_marker_dies_inside_deletion() {
        let m = marker(10, 10);
        assert_eq!(m.updated_range(&delete(8, 5), DOC_LEN), None);
    }

    #[test]
    fn point_marker_expands_only_when_greedy_both_ways() {
        let both = greedy(10, 10, true, true);
        assert_eq!(
            both.updated_range(&insert(10, 3), DOC_LEN).unwrap(),
            TextRange::new(10, 13)
        );
        let left_only = greedy(10, 10, true, false);
        assert_eq!(
            left_only.updated_range(&insert(10, 3), DOC_LEN).unwrap(),
            TextRange::empty(10)
        );
    }
}
