//! Coordinate mapping between a host document and an injected fragment.
//!
//! An injected document is assembled from one or more host spans, each
//! optionally wrapped in non-editable "affix" text (a prefix/suffix that
//! exists only in the injected view, e.g. synthetic quotes or a template
//! preamble). Offsets that land inside an affix have no host counterpart;
//! they clamp to the fragment boundary instead of the raw transform
//! result.

use crate::pointers::range::TextRange;

/// One host span of an injected document.
///
/// `host_range` is relative to the start of the host element carrying the
/// injection, so the layout stays valid while the host pointer tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AffixFragment {
    pub host_range: TextRange,
    pub prefix_len: usize,
    pub suffix_len: usize,
}

impl AffixFragment {
    pub fn new(host_range: TextRange, prefix_len: usize, suffix_len: usize) -> Self {
        Self {
            host_range,
            prefix_len,
            suffix_len,
        }
    }

    fn injected_len(&self) -> usize {
        self.prefix_len + self.host_range.len() + self.suffix_len
    }
}

/// The fragment list describing one injected document, in host order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InjectedLayout {
    fragments: Vec<AffixFragment>,
}

impl InjectedLayout {
    pub fn new(fragments: Vec<AffixFragment>) -> Self {
        assert!(!fragments.is_empty(), "injected layout with no fragments");
        for pair in fragments.windows(2) {
            assert!(
                pair[0].host_range.end <= pair[1].host_range.start,
                "injected fragments out of order"
            );
        }
        Self { fragments }
    }

    /// Length of the assembled injected document.
    pub fn injected_len(&self) -> usize {
        self.fragments.iter().map(AffixFragment::injected_len).sum()
    }

    /// Map an injected offset to a host-relative offset. Offsets inside a
    /// non-editable affix clamp to the fragment boundary. `None` when the
    /// offset is past the end of the injected document.
    pub fn host_offset(&self, injected: usize) -> Option<usize> {
        let mut consumed = 0;
        for frag in &self.fragments {
            let len = frag.injected_len();
            // The very end of the document maps through the last fragment.
            let local = injected - consumed;
            if local < len || (consumed + len == self.injected_len() && local == len) {
                return Some(if local < frag.prefix_len {
                    frag.host_range.start
                } else if local <= frag.prefix_len + frag.host_range.len() {
                    frag.host_range.start + (local - frag.prefix_len)
                } else {
                    frag.host_range.end
                });
            }
            consumed += len;
        }
        None
    }

    /// Map an injected range to host-relative coordinates.
    pub fn host_range(&self, injected: TextRange) -> Option<TextRange> {
        let start = self.host_offset(injected.start)?;
        let end = self.host_offset(injected.end)?;
        Some(TextRange::new(start, end.max(start)))
    }

    /// Inverse mapping: host-relative offset to injected offset. Host
    /// offsets in the gaps between fragments expand to the start of the
    /// following fragment's editable span.
    pub fn injected_offset(&self, host: usize) -> Option<usize> {
        let mut consumed = 0;
        for frag in &self.fragments {
            if host < frag.host_range.start {
                return Some(consumed + frag.prefix_len);
            }
            if host <= frag.host_range.end {
                return Some(consumed + frag.prefix_len + (host - frag.host_range.start));
            }
            consumed += frag.injected_len();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One fragment: host [4, 10) wrapped as `"` + text + `"` in the
    // injected view, so injected length is 1 + 6 + 1 = 8.
    fn quoted() -> InjectedLayout {
        InjectedLayout::new(vec![AffixFragment::new(TextRange::new(4, 10), 1, 1)])
    }

    #[test]
    fn editable_span_maps_linearly() {
        let l = quoted();
        assert_eq!(l.host_offset(1), Some(4));
        assert_eq!(l.host_offset(4), Some(7));
        assert_eq!(l.host_offset(7), Some(10));
    }

    #[test]
    fn affix_offsets_clamp_to_fragment_boundary() {
        let l = quoted();
        // inside the prefix quote
        assert_eq!(l.host_offset(0), Some(4));
        // inside the suffix quote, and the document end
        assert_eq!(l.host_offset(8), Some(10));
        assert_eq!(l.host_offset(9), None);
    }

    #[test]
    fn range_mapping_clamps_both_ends() {
        let l = quoted();
        assert_eq!(
            l.host_range(TextRange::new(0, 8)),
            Some(TextRange::new(4, 10))
        );
        assert_eq!(
            l.host_range(TextRange::new(2, 5)),
            Some(TextRange::new(5, 8))
        );
    }

    #[test]
    fn multi_fragment_layout_accumulates() {
        // Two fragments: [0,3) with no affixes, then [10,14) with a
        // 2-byte prefix. Injected layout: 0..3 | 3..5 prefix | 5..9.
        let l = InjectedLayout::new(vec![
            AffixFragment::new(TextRange::new(0, 3), 0, 0),
            AffixFragment::new(TextRange::new(10, 14), 2, 0),
        ]);
        assert_eq!(l.injected_len(), 9);
        assert_eq!(l.host_offset(2), Some(2));
        assert_eq!(l.host_offset(3), Some(10)); // prefix clamps forward
        assert_eq!(l.host_offset(5), Some(10));
        assert_eq!(l.host_offset(9), Some(14));
    }

    #[test]
    fn inverse_mapping_expands_gaps() {
        let l = InjectedLayout::new(vec![
            AffixFragment::new(TextRange::new(0, 3), 0, 0),
            AffixFragment::new(TextRange::new(10, 14), 2, 0),
        ]);
        assert_eq!(l.injected_offset(1), Some(1));
        // host offset in the gap between fragments
        assert_eq!(l.injected_offset(6), Some(5));
        assert_eq!(l.injected_offset(12), Some(7));
        assert_eq!(l.injected_offset(20), None);
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn overlapping_fragments_rejected() {
        InjectedLayout::new(vec![
            AffixFragment::new(TextRange::new(0, 5), 0, 0),
            AffixFragment::new(TextRange::new(3, 8), 0, 0),
        ]);
    }
}
