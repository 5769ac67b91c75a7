//! Per-document pointer registry.
//!
//! Registered pointers live in a slot vector of weak references, with a
//! watermark (`next_free`) separating used from untouched slots. The
//! vector grows by half, compacts when the watermark exceeds twice the
//! live count, and sorts lazily by reconciled range; released and dropped
//! handles are swept opportunistically rather than through a finalizer.

use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, trace};

use crate::host::{DocEvent, FileKey, FrozenDoc, HostDocument};
use crate::pointers::info::ElementInfo;
use crate::pointers::marker_cache::MarkerCache;
use crate::pointers::pointer::PointerInner;
use crate::pointers::range::TextRange;
use crate::util::lock;

/// Slot value of a pointer that is not (or no longer) registered.
pub(crate) const UNREGISTERED_SLOT: usize = usize::MAX;

/// Registry occupancy counters, exposed for capacity assertions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegistryStats {
    /// Pointers whose handles are still alive.
    pub live: usize,
    /// Slot watermark; slots below it have been used since the last
    /// compaction.
    pub span: usize,
    pub capacity: usize,
}

pub(crate) struct DocRegistry {
    file: FileKey,
    state: Mutex<RegistryState>,
}

struct RegistryState {
    slots: Vec<Option<Weak<PointerInner>>>,
    next_free: usize,
    live: usize,
    sorted: bool,
    cache: MarkerCache,
}

impl DocRegistry {
    pub(crate) fn new(file: FileKey) -> Self {
        Self {
            file,
            state: Mutex::new(RegistryState {
                slots: Vec::new(),
                next_free: 0,
                live: 0,
                sorted: true,
                cache: MarkerCache::new(),
            }),
        }
    }

    pub(crate) fn file(&self) -> FileKey {
        self.file
    }

    /// Register `info`, or reuse an existing live pointer to the same
    /// target (bumping its reference count) instead of adding a duplicate.
    pub(crate) fn add_or_reuse(self: &Arc<Self>, info: ElementInfo) -> Arc<PointerInner> {
        let mut state = lock(&self.state);
        for existing in state.collect_live() {
            let same = existing.with_info(|held| held.points_to_same(&info));
            if same && existing.retain() {
                trace!(file = ?self.file, "reusing pointer to identical target");
                return existing;
            }
        }
        let inner = Arc::new(PointerInner::new(info, Some(Arc::downgrade(self))));
        state.add(&inner);
        inner
    }

    /// Drop one slot after its last handle was released. Returns the live
    /// count afterwards so the caller can decide to disconnect.
    pub(crate) fn remove_reference(&self, inner: &PointerInner) -> usize {
        let mut state = lock(&self.state);
        state.remove(inner);
        state.live
    }

    /// Fold the pending batch over every tracked info and write the
    /// reconciled ranges back. Called once per commit, before reparse.
    pub(crate) fn update_markers(
        &self,
        doc: &HostDocument,
        frozen: &FrozenDoc,
        events: &[DocEvent],
    ) {
        let mut state = lock(&self.state);
        state.fasten_belts(doc);
        let sorted = state.ensure_sorted();
        debug!(
            file = ?self.file,
            infos = sorted.len(),
            events = events.len(),
            "updating markers"
        );
        let still_sorted = state.cache.update_markers(&sorted, frozen, events);
        if !still_sorted {
            state.sorted = false;
        }
    }

    /// Current range of one registered info under the pending batch.
    pub(crate) fn updated_range(
        &self,
        target: &Arc<PointerInner>,
        frozen: &FrozenDoc,
        events: &[DocEvent],
    ) -> Option<TextRange> {
        let mut state = lock(&self.state);
        let sorted = state.ensure_sorted();
        state.cache.updated_range(target, &sorted, frozen, events)
    }

    /// Re-identify every tracked node against the fresh tree, snapping
    /// stored ranges to the re-found nodes' actual extents.
    pub(crate) fn after_reparse(&self, doc: &HostDocument) {
        let mut state = lock(&self.state);
        let mut changed = false;
        for inner in state.collect_live() {
            if inner.retarget(doc) {
                changed = true;
            }
        }
        if changed {
            state.sorted = false;
        }
        state.cache.clear();
    }

    /// Make anchors into a now-parsed document range-tracked.
    pub(crate) fn fasten_belts(&self, doc: &HostDocument) {
        lock(&self.state).fasten_belts(doc);
    }

    /// Clear slots whose handles were dropped without release, then
    /// compact if warranted. Returns the live count.
    pub(crate) fn sweep(&self) -> usize {
        let mut state = lock(&self.state);
        // The fold cache keeps strong handles to the tracked infos; drop
        // them first so pointers whose handles are gone become sweepable.
        state.cache.clear();
        state.sweep_dead();
        state.maybe_compact();
        state.live
    }

    pub(crate) fn stats(&self) -> RegistryStats {
        let state = lock(&self.state);
        RegistryStats {
            live: state.live,
            span: state.next_free,
            capacity: state.slots.len(),
        }
    }
}

impl RegistryState {
    fn add(&mut self, inner: &Arc<PointerInner>) {
        if self.next_free == self.slots.len() {
            // Reclaim before growing.
            self.sweep_dead();
            self.maybe_compact();
        }
        if self.next_free == self.slots.len() {
            let grown = self.slots.len() * 3 / 2 + 1;
            self.slots.resize_with(grown, || None);
        }
        let idx = self.next_free;
        assert!(
            self.slots[idx].is_none(),
            "pointer slot {idx} already occupied"
        );
        self.slots[idx] = Some(Arc::downgrade(inner));
        inner.set_slot(idx);
        self.next_free += 1;
        self.live += 1;
        self.sorted = false;
        self.cache.clear();
    }

    fn remove(&mut self, inner: &PointerInner) {
        let idx = inner.clear_slot();
        if idx == UNREGISTERED_SLOT {
            return;
        }
        assert!(idx < self.next_free, "pointer slot {idx} out of registry span");
        let occupant_matches = self.slots[idx]
            .as_ref()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), inner));
        assert!(occupant_matches, "registry slot bookkeeping drift");
        self.slots[idx] = None;
        self.live -= 1;
        self.cache.clear();
        self.maybe_compact();
    }

    /// Clear slots whose pointer was dropped without an explicit release.
    fn sweep_dead(&mut self) {
        let mut removed = 0;
        for slot in &mut self.slots[..self.next_free] {
            if let Some(weak) = slot {
                if weak.strong_count() == 0 {
                    *slot = None;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            trace!(removed, "swept dropped pointer slots");
            self.live -= removed;
            self.cache.clear();
        }
    }

    fn maybe_compact(&mut self) {
        if self.next_free > self.live * 2 {
            self.compact();
        }
    }

    /// Slide live entries down to a dense prefix, fixing each pointer's
    /// slot index as it moves.
    fn compact(&mut self) {
        let mut kept = 0;
        for idx in 0..self.next_free {
            let Some(weak) = self.slots[idx].take() else {
                continue;
            };
            let Some(inner) = weak.upgrade() else {
                // Died since the last sweep.
                self.live -= 1;
                continue;
            };
            inner.set_slot(kept);
            self.slots[kept] = Some(weak);
            kept += 1;
        }
        assert_eq!(kept, self.live, "registry size bookkeeping drift");
        self.next_free = kept;
    }

    fn collect_live(&self) -> Vec<Arc<PointerInner>> {
        self.slots[..self.next_free]
            .iter()
            .filter_map(|slot| slot.as_ref()?.upgrade())
            .collect()
    }

    /// Live pointers in range order, re-sorting the slot vector first if a
    /// write-back or registration disturbed it. Sort keys are snapshotted
    /// before sorting so the comparator takes no locks.
    fn ensure_sorted(&mut self) -> Vec<Arc<PointerInner>> {
        if self.sorted {
            return self.collect_live();
        }
        let mut keyed: Vec<_> = self
            .collect_live()
            .into_iter()
            .map(|inner| (inner.sort_key(), inner))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        for slot in &mut self.slots[..self.next_free] {
            *slot = None;
        }
        for (idx, (_, inner)) in keyed.iter().enumerate() {
            inner.set_slot(idx);
            self.slots[idx] = Some(Arc::downgrade(inner));
        }
        self.next_free = keyed.len();
        self.live = keyed.len();
        self.sorted = true;
        keyed.into_iter().map(|(_, inner)| inner).collect()
    }

    fn fasten_belts(&mut self, doc: &HostDocument) {
        self.sweep_dead();
        let mut changed = false;
        for inner in self.collect_live() {
            if inner.fasten(doc) {
                changed = true;
            }
        }
        if changed {
            self.sorted = false;
            self.cache.clear();
        }
    }
}

impl std::fmt::Debug for DocRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("DocRegistry")
            .field("file", &self.file)
            .field("live", &stats.live)
            .field("span", &stats.span)
            .field("capacity", &stats.capacity)
            .finish()
    }
}
