//! Batch reconciliation of every tracked range in one document.
//!
//! The cache holds the outcome of folding the pending event batch over the
//! registry's sorted infos. Asking for ranges repeatedly mid-batch is
//! cheap: a strict prefix extension of the cached batch folds only the new
//! events; anything else rebuilds from the committed snapshot. Infos that
//! share a `(range, greedy, survive)` tuple at build time share one marker
//! slot, so a thousand coincident pointers cost one marker's worth of
//! arithmetic per event.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::host::{DocEvent, FrozenDoc};
use crate::pointers::marker::ManualMarker;
use crate::pointers::pointer::PointerInner;
use crate::pointers::range::TextRange;

/// Seed tuple a tracked info contributes to the fold.
pub(crate) type MarkerSeed = (TextRange, bool, bool, bool);

#[derive(Debug, Default)]
pub(crate) struct MarkerCache {
    updated: Option<UpdatedRanges>,
}

/// The folded state: which infos were tracked, their shared markers, and
/// how many events of the batch have been applied.
#[derive(Debug)]
struct UpdatedRanges {
    event_count: usize,
    /// Rolling snapshot; always `event_count` events past the committed
    /// text, feeding `prior_len` to the next fold step.
    frozen: FrozenDoc,
    /// Tracked infos in registry sort order at build time.
    tracked: Vec<Arc<PointerInner>>,
    /// Index into `markers` per tracked info.
    marker_of: Vec<usize>,
    markers: Vec<Option<ManualMarker>>,
}

impl MarkerCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn clear(&mut self) {
        self.updated = None;
    }

    /// Bring the cached fold up to `events`. Reuses the cached state when
    /// the batch is unchanged or strictly extends it; rebuilds otherwise.
    fn fold(&mut self, sorted: &[Arc<PointerInner>], frozen: &FrozenDoc, events: &[DocEvent]) {
        match self.updated.take() {
            Some(cached) if cached.event_count == events.len() => {
                self.updated = Some(cached);
            }
            Some(mut cached) if cached.event_count < events.len() => {
                trace!(
                    applied = cached.event_count,
                    total = events.len(),
                    "extending cached marker fold"
                );
                let applied = cached.event_count;
                apply_events(&mut cached, &events[applied..]);
                self.updated = Some(cached);
            }
            _ => {
                debug!(
                    infos = sorted.len(),
                    events = events.len(),
                    "rebuilding marker fold from committed snapshot"
                );
                let mut built = build(sorted, frozen.clone());
                apply_events(&mut built, events);
                self.updated = Some(built);
            }
        }
    }

    /// Fold the full batch and write every reconciled range back into its
    /// info. Consumes the cache (a commit ends the batch) and reports
    /// whether the registry's sort order survived the write-back.
    pub(crate) fn update_markers(
        &mut self,
        sorted: &[Arc<PointerInner>],
        frozen: &FrozenDoc,
        events: &[DocEvent],
    ) -> bool {
        self.fold(sorted, frozen, events);
        let Some(updated) = self.updated.take() else {
            return true;
        };
        let mut still_sorted = true;
        let mut prev_key = None;
        for (i, inner) in updated.tracked.iter().enumerate() {
            let new_range = updated.markers[updated.marker_of[i]].map(|m| m.range());
            inner.set_tracked_range(new_range);
            let key = inner.sort_key();
            if let Some(prev) = &prev_key {
                if *prev > key {
                    still_sorted = false;
                }
            }
            prev_key = Some(key);
        }
        still_sorted
    }

    /// Current range of one info under the pending batch, without
    /// committing anything. Infos absent from the cached structure (added
    /// mid-batch) fold a solo marker instead.
    pub(crate) fn updated_range(
        &mut self,
        target: &Arc<PointerInner>,
        sorted: &[Arc<PointerInner>],
        frozen: &FrozenDoc,
        events: &[DocEvent],
    ) -> Option<TextRange> {
        self.fold(sorted, frozen, events);
        let updated = self.updated.as_ref()?;
        let key = target.sort_key();
        if let Ok(found) = updated
            .tracked
            .binary_search_by(|p| p.sort_key().cmp(&key))
        {
            // Widen over the run of equal keys to find the exact info.
            let mut i = found;
            while i > 0 && updated.tracked[i - 1].sort_key() == key {
                i -= 1;
            }
            while i < updated.tracked.len() && updated.tracked[i].sort_key() == key {
                if Arc::ptr_eq(&updated.tracked[i], target) {
                    return updated.markers[updated.marker_of[i]].map(|m| m.range());
                }
                i += 1;
            }
        }
        solo_fold(target, frozen, events)
    }
}

/// Build the fold structure from sorted infos at event count zero,
/// deduplicating consecutive identical seeds into shared marker slots.
fn build(sorted: &[Arc<PointerInner>], frozen: FrozenDoc) -> UpdatedRanges {
    let mut tracked = Vec::new();
    let mut marker_of = Vec::new();
    let mut markers: Vec<Option<ManualMarker>> = Vec::new();
    let mut prev_seed: Option<MarkerSeed> = None;
    for inner in sorted {
        let Some(seed) = inner.marker_seed() else {
            continue;
        };
        if prev_seed != Some(seed) {
            markers.push(Some(seed_marker(seed)));
            prev_seed = Some(seed);
        }
        tracked.push(Arc::clone(inner));
        marker_of.push(markers.len() - 1);
    }
    UpdatedRanges {
        event_count: 0,
        frozen,
        tracked,
        marker_of,
        markers,
    }
}

fn seed_marker((range, greedy_left, greedy_right, survive): MarkerSeed) -> ManualMarker {
    let marker = ManualMarker::new(range, greedy_left, greedy_right);
    if survive { marker.surviving() } else { marker }
}

/// Apply `events` in order to every live marker, advancing the rolling
/// snapshot between events so each fold step sees the right prior length.
fn apply_events(updated: &mut UpdatedRanges, events: &[DocEvent]) {
    for ev in events {
        let prior_len = updated.frozen.len();
        for slot in &mut updated.markers {
            if let Some(marker) = slot {
                match marker.updated_range(ev, prior_len) {
                    Some(range) => {
                        marker.start = range.start;
                        marker.end = range.end;
                    }
                    None => *slot = None,
                }
            }
        }
        updated.frozen = updated.frozen.advance(ev);
        updated.event_count += 1;
    }
}

/// Fold one marker alone through the batch, for infos outside the cached
/// structure.
fn solo_fold(
    target: &Arc<PointerInner>,
    frozen: &FrozenDoc,
    events: &[DocEvent],
) -> Option<TextRange> {
    let seed = target.marker_seed()?;
    let mut marker = seed_marker(seed);
    let mut prior_len = frozen.len();
    for ev in events {
        let range = marker.updated_range(ev, prior_len)?;
        marker.start = range.start;
        marker.end = range.end;
        prior_len = prior_len - ev.old_len + ev.new_len();
    }
    Some(marker.range())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xi_rope::Rope;

    use crate::host::FileKey;
    use crate::pointers::info::{ElementInfo, RangeSpec, SelfInfo};

    fn tracked(file: FileKey, start: usize, end: usize) -> Arc<PointerInner> {
        Arc::new(PointerInner::new(
            ElementInfo::SelfRange(SelfInfo {
                file,
                spec: RangeSpec::tracking(TextRange::new(start, end)),
                kit: None,
            }),
            None,
        ))
    }

    fn frozen(text: &str) -> FrozenDoc {
        FrozenDoc::new(Rope::from(text), 0)
    }

    #[test]
    fn coincident_seeds_share_one_marker() {
        let file = FileKey::new();
        let sorted = vec![
            tracked(file, 2, 6),
            tracked(file, 2, 6),
            tracked(file, 8, 9),
        ];
        let built = build(&sorted, frozen("0123456789"));
        assert_eq!(built.markers.len(), 2);
        assert_eq!(built.marker_of, vec![0, 0, 1]);
    }

    #[test]
    fn empty_batch_is_identity() {
        let file = FileKey::new();
        let a = tracked(file, 2, 6);
        let b = tracked(file, 8, 9);
        let sorted = vec![Arc::clone(&a), Arc::clone(&b)];
        let snapshot = frozen("0123456789");
        let mut cache = MarkerCache::new();

        assert_eq!(
            cache.updated_range(&a, &sorted, &snapshot, &[]),
            Some(TextRange::new(2, 6))
        );

        let still_sorted = cache.update_markers(&sorted, &snapshot, &[]);
        assert!(still_sorted);
        assert_eq!(a.marker_seed().map(|s| s.0), Some(TextRange::new(2, 6)));
        assert_eq!(b.marker_seed().map(|s| s.0), Some(TextRange::new(8, 9)));
    }

    #[test]
    fn write_back_moves_every_tracked_info() {
        let file = FileKey::new();
        let a = tracked(file, 2, 6);
        let b = tracked(file, 8, 9);
        let sorted = vec![Arc::clone(&a), Arc::clone(&b)];
        let mut cache = MarkerCache::new();

        let events = [DocEvent::replace(0, 0, "xx")];
        let still_sorted = cache.update_markers(&sorted, &frozen("0123456789"), &events);
        assert!(still_sorted);
        assert_eq!(a.marker_seed().map(|s| s.0), Some(TextRange::new(4, 8)));
        assert_eq!(b.marker_seed().map(|s| s.0), Some(TextRange::new(10, 11)));
    }

    #[test]
    fn consumed_marker_writes_back_none_and_unsorts() {
        let file = FileKey::new();
        let a = tracked(file, 2, 6);
        let b = tracked(file, 8, 9);
        let sorted = vec![Arc::clone(&a), Arc::clone(&b)];
        let mut cache = MarkerCache::new();

        let events = [DocEvent::replace(1, 6, "")];
        let still_sorted = cache.update_markers(&sorted, &frozen("0123456789"), &events);
        // The first info died and now sorts after the surviving one.
        assert!(!still_sorted);
        assert_eq!(a.marker_seed(), None);
        assert_eq!(b.marker_seed().map(|s| s.0), Some(TextRange::new(2, 3)));
    }

    #[test]
    fn batch_extension_folds_only_new_events() {
        let file = FileKey::new();
        let a = tracked(file, 2, 6);
        let sorted = vec![Arc::clone(&a)];
        let snapshot = frozen("0123456789");
        let mut cache = MarkerCache::new();

        let first = DocEvent::replace(0, 0, "xx");
        let r1 = cache.updated_range(&a, &sorted, &snapshot, std::slice::from_ref(&first));
        assert_eq!(r1, Some(TextRange::new(4, 8)));

        let both = [first, DocEvent::replace(0, 1, "")];
        let r2 = cache.updated_range(&a, &sorted, &snapshot, &both);
        assert_eq!(r2, Some(TextRange::new(3, 7)));
        // Nothing was written back mid-batch.
        assert_eq!(a.marker_seed().map(|s| s.0), Some(TextRange::new(2, 6)));
    }

    #[test]
    fn info_outside_the_cached_structure_folds_solo() {
        let file = FileKey::new();
        let a = tracked(file, 2, 6);
        let late = tracked(file, 1, 2);
        let sorted = vec![Arc::clone(&a)];
        let snapshot = frozen("0123456789");
        let mut cache = MarkerCache::new();

        let events = [DocEvent::replace(0, 0, "xx")];
        assert_eq!(
            cache.updated_range(&late, &sorted, &snapshot, &events),
            Some(TextRange::new(3, 4))
        );
    }
}
