//! The public pointer handle and the engine that owns the registries.
//!
//! A [`Pointer`] is a cheap clonable handle onto a shared inner record;
//! creating a pointer to a target another live pointer already covers
//! reuses that record and bumps its reference count. The count saturates:
//! once it hits the ceiling the pointer is immortal, and once it reaches
//! zero it is disposed for good.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use crate::host::{
    DocEvent, FileKey, FrozenDoc, HostDocument, LanguageId, Vfs, VfsEntry,
};
use crate::pointers::fingerprint::Identikit;
use crate::pointers::info::{
    self, AnchorInfo, Element, ElementInfo, InjectedInfo, RangeSpec, SelfInfo,
};
use crate::pointers::injected::InjectedLayout;
use crate::pointers::marker_cache::MarkerSeed;
use crate::pointers::range::TextRange;
use crate::pointers::registry::{DocRegistry, RegistryStats, UNREGISTERED_SLOT};
use crate::pointers::restore;
use crate::util::lock;

/// Ordering key for the registry's slot vector: range-less infos sort
/// after every ranged one.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub(crate) struct SortKey {
    rangeless: bool,
    start: usize,
    end: usize,
    greedy: u8,
}

/// Shared pointer record. The refcount, slot index and cached element are
/// all interior-mutable; the info mutex is the innermost lock in the
/// crate (a registry lock may be held around it, never the reverse).
pub(crate) struct PointerInner {
    info: Mutex<ElementInfo>,
    cached: Mutex<Option<(u64, Element)>>,
    refs: AtomicU32,
    slot: AtomicUsize,
    registry: Option<Weak<DocRegistry>>,
}

impl PointerInner {
    pub(crate) fn new(info: ElementInfo, registry: Option<Weak<DocRegistry>>) -> Self {
        Self {
            info: Mutex::new(info),
            cached: Mutex::new(None),
            refs: AtomicU32::new(1),
            slot: AtomicUsize::new(UNREGISTERED_SLOT),
            registry,
        }
    }

    pub(crate) fn with_info<R>(&self, f: impl FnOnce(&ElementInfo) -> R) -> R {
        f(&lock(&self.info))
    }

    fn with_info_mut<R>(&self, f: impl FnOnce(&mut ElementInfo) -> R) -> R {
        f(&mut lock(&self.info))
    }

    pub(crate) fn registry(&self) -> Option<&Weak<DocRegistry>> {
        self.registry.as_ref()
    }

    pub(crate) fn sort_key(&self) -> SortKey {
        self.with_info(|info| match info.tracked().and_then(|spec| spec.range) {
            Some(range) => SortKey {
                rangeless: false,
                start: range.start,
                end: range.end,
                greedy: info_greedy(info),
            },
            None => SortKey {
                rangeless: true,
                start: 0,
                end: 0,
                greedy: 0,
            },
        })
    }

    pub(crate) fn marker_seed(&self) -> Option<MarkerSeed> {
        self.with_info(|info| {
            let spec = info.tracked()?;
            Some((
                spec.range?,
                spec.greedy_left,
                spec.greedy_right,
                spec.survive_on_external_change,
            ))
        })
    }

    pub(crate) fn set_tracked_range(&self, range: Option<TextRange>) {
        self.with_info_mut(|info| info.set_tracked_range(range));
    }

    /// Upgrade an unfastened anchor to range tracking once its document
    /// has a tree. Snaps to the re-found node when possible, otherwise to
    /// the stub's recorded range.
    pub(crate) fn fasten(&self, doc: &HostDocument) -> bool {
        self.with_info_mut(|held| {
            let ElementInfo::Anchor(anchor) = held else {
                return false;
            };
            if anchor.spec.is_some() || anchor.file != doc.file() {
                return false;
            }
            let Some(tree) = doc.tree() else {
                return false;
            };
            let spec = match doc.stubs().and_then(|t| t.get(anchor.stub)) {
                Some(entry) => {
                    let found = restore::find_node_at_range(
                        tree,
                        entry.range,
                        &anchor.kit,
                        doc.language(),
                    );
                    let range = found
                        .map(|n| TextRange::new(n.start_byte(), n.end_byte()))
                        .unwrap_or(entry.range);
                    RangeSpec::tracking(range)
                }
                None => RangeSpec::dead(),
            };
            anchor.spec = Some(spec);
            true
        })
    }

    /// Snap the stored range to the re-found node's extent in the fresh
    /// tree. Returns whether the range moved.
    pub(crate) fn retarget(&self, doc: &HostDocument) -> bool {
        self.with_info_mut(|held| {
            let (file, spec, kit) = match held {
                ElementInfo::SelfRange(SelfInfo {
                    file,
                    spec,
                    kit: Some(kit),
                }) => (*file, spec, Arc::clone(kit)),
                ElementInfo::Anchor(AnchorInfo {
                    file,
                    spec: Some(spec),
                    kit,
                    ..
                }) => (*file, spec, Arc::clone(kit)),
                _ => return false,
            };
            if file != doc.file() {
                return false;
            }
            let (Some(range), Some(tree)) = (spec.range, doc.tree()) else {
                return false;
            };
            match restore::find_node_at_range(tree, range, &kit, doc.language()) {
                Some(node) => {
                    let actual = TextRange::new(node.start_byte(), node.end_byte());
                    if actual != range {
                        spec.range = Some(actual);
                        return true;
                    }
                    false
                }
                None => false,
            }
        })
    }

    /// Bump the refcount unless the pointer is already disposed. A
    /// saturated count stays saturated.
    pub(crate) fn retain(&self) -> bool {
        let mut current = self.refs.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return false;
            }
            if current == u32::MAX {
                return true;
            }
            match self.refs.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop one reference, returning the remaining count. Zero means
    /// disposed; a disposed or saturated count never moves again.
    pub(crate) fn release(&self) -> u32 {
        let mut current = self.refs.load(Ordering::Relaxed);
        loop {
            if current == 0 || current == u32::MAX {
                return current;
            }
            match self.refs.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current - 1,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Relaxed)
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot.load(Ordering::Relaxed)
    }

    pub(crate) fn set_slot(&self, idx: usize) {
        self.slot.store(idx, Ordering::Relaxed);
    }

    pub(crate) fn clear_slot(&self) -> usize {
        self.slot.swap(UNREGISTERED_SLOT, Ordering::Relaxed)
    }

    fn containing_file(&self) -> Option<FileKey> {
        self.with_info(|held| match held {
            ElementInfo::SelfRange(SelfInfo { file, .. })
            | ElementInfo::Anchor(AnchorInfo { file, .. })
            | ElementInfo::File { file, .. }
            | ElementInfo::Cls { file, .. } => Some(*file),
            ElementInfo::Injected(injected) => injected.host.containing_file(),
            ElementInfo::Hard { .. } | ElementInfo::Dir { .. } => None,
        })
    }

    fn virtual_file(&self) -> Option<FileKey> {
        self.with_info(|held| match held {
            ElementInfo::SelfRange(SelfInfo { file, .. })
            | ElementInfo::Anchor(AnchorInfo { file, .. })
            | ElementInfo::File { file, .. }
            | ElementInfo::Cls { file, .. } => Some(*file),
            ElementInfo::Dir { dir } => Some(*dir),
            ElementInfo::Injected(injected) => injected.host.virtual_file(),
            ElementInfo::Hard { .. } => None,
        })
    }

    /// Restore the element, caching the result against the containing
    /// document's committed stamp.
    fn element(&self, vfs: &Vfs) -> Option<Element> {
        let stamp = self
            .virtual_file()
            .and_then(|file| vfs.document(file))
            .map(|doc| doc.committed_stamp())
            .unwrap_or(0);
        {
            let cached = lock(&self.cached);
            if let Some((cached_stamp, element)) = &*cached {
                if *cached_stamp == stamp && element_alive(element, vfs) {
                    return Some(element.clone());
                }
            }
        }
        let restored = self.with_info(|held| held.restore(vfs))?;
        *lock(&self.cached) = Some((stamp, restored.clone()));
        Some(restored)
    }
}

fn info_greedy(info: &ElementInfo) -> u8 {
    match info.tracked() {
        Some(spec) => (spec.greedy_left as u8) << 1 | spec.greedy_right as u8,
        None => 0,
    }
}

fn element_alive(element: &Element, vfs: &Vfs) -> bool {
    match element {
        Element::Synthetic(node) => node.is_valid(),
        Element::Node(target) => vfs.entry(target.file).is_some(),
        Element::File(file) => vfs.entry(*file).is_some(),
        Element::Directory(dir) => vfs.is_directory(*dir),
    }
}

impl std::fmt::Debug for PointerInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointerInner")
            .field("refs", &self.ref_count())
            .field("slot", &self.slot())
            .finish()
    }
}

/// Handle onto a tracked target. Clones share one record; equality is
/// record identity.
#[derive(Clone, Debug)]
pub struct Pointer {
    inner: Arc<PointerInner>,
}

impl PartialEq for Pointer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Pointer {}

impl Pointer {
    fn from_inner(inner: Arc<PointerInner>) -> Self {
        Self { inner }
    }

    fn unregistered(info: ElementInfo) -> Self {
        Self::from_inner(Arc::new(PointerInner::new(info, None)))
    }

    pub(crate) fn inner(&self) -> &Arc<PointerInner> {
        &self.inner
    }

    /// Restore the pointed-at element against the current host state.
    /// `None` once the target is gone; a `None` result is permanent for
    /// range-tracked pointers.
    pub fn element(&self, vfs: &Vfs) -> Option<Element> {
        self.inner.element(vfs)
    }

    /// The target's range in committed-document coordinates.
    pub fn psi_range(&self, vfs: &Vfs) -> Option<TextRange> {
        self.inner.with_info(|held| held.psi_range(vfs))
    }

    /// The target's range with pending (uncommitted) edits folded in.
    /// Falls back to [`Pointer::psi_range`] when nothing is pending.
    pub fn range(&self, vfs: &Vfs) -> Option<TextRange> {
        let doc = self.containing_file().and_then(|file| vfs.document(file));
        let pending_empty = doc.map(|d| d.pending_events().is_empty()).unwrap_or(true);
        if pending_empty {
            return self.psi_range(vfs);
        }
        let doc = doc?;
        if self.inner.marker_seed().is_some() {
            let registry = self.inner.registry()?.upgrade()?;
            return registry.updated_range(&self.inner, &doc.frozen(), doc.pending_events());
        }
        enum Untracked {
            File,
            Injected(Pointer, InjectedLayout, TextRange),
            Other,
        }
        let kind = self.inner.with_info(|held| match held {
            ElementInfo::File { .. } => Untracked::File,
            ElementInfo::Injected(injected) => Untracked::Injected(
                injected.host.clone(),
                injected.layout.clone(),
                injected.injected_range,
            ),
            _ => Untracked::Other,
        });
        match kind {
            Untracked::File => Some(TextRange::new(0, doc.len())),
            Untracked::Injected(host, layout, injected_range) => {
                let host_range = host.range(vfs)?;
                info::map_into_host(&layout, injected_range, host_range)
            }
            Untracked::Other => self.psi_range(vfs),
        }
    }

    /// The document the target lives in; `None` for directories and
    /// synthetic nodes.
    pub fn containing_file(&self) -> Option<FileKey> {
        self.inner.containing_file()
    }

    /// The file-table identity the pointer is attached to, directories
    /// included.
    pub fn virtual_file(&self) -> Option<FileKey> {
        self.inner.virtual_file()
    }

    pub fn ref_count(&self) -> u32 {
        self.inner.ref_count()
    }

    /// Whether two pointers denote the same target, without restoring
    /// either. Distinct records may still be the same target when one of
    /// them was created unregistered.
    pub fn points_to_same(&self, other: &Pointer) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        // Lock both infos in address order so concurrent comparisons in
        // opposite directions cannot deadlock.
        let (first, second) = if Arc::as_ptr(&self.inner) < Arc::as_ptr(&other.inner) {
            (&self.inner, &other.inner)
        } else {
            (&other.inner, &self.inner)
        };
        let a = lock(&first.info);
        let b = lock(&second.info);
        a.points_to_same(&b)
    }
}

/// Process-wide pointer service: one registry per document, created on
/// first registration and disconnected when the last pointer goes.
#[derive(Debug, Default)]
pub struct PointerEngine {
    registries: Mutex<HashMap<FileKey, Arc<DocRegistry>>>,
}

impl PointerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reuse) a pointer to `element`. The restoration strategy
    /// is picked here, once, from the element's kind and its file's state.
    pub fn create_pointer(&self, vfs: &Vfs, element: &Element) -> Pointer {
        match element {
            Element::Synthetic(node) => Pointer::unregistered(ElementInfo::Hard {
                node: Arc::clone(node),
            }),
            Element::Directory(dir) => Pointer::unregistered(ElementInfo::Dir { dir: *dir }),
            Element::File(file) => match vfs.entry(*file) {
                Some(VfsEntry::Document(doc)) => self.register(
                    *file,
                    ElementInfo::File {
                        file: *file,
                        language: doc.language(),
                    },
                ),
                Some(VfsEntry::Directory(_)) => {
                    Pointer::unregistered(ElementInfo::Dir { dir: *file })
                }
                _ => Pointer::unregistered(ElementInfo::File {
                    file: *file,
                    language: LanguageId(0),
                }),
            },
            Element::Node(target) => match vfs.entry(target.file) {
                Some(VfsEntry::Document(doc)) => {
                    if doc.tree().is_some() {
                        self.register(
                            target.file,
                            ElementInfo::SelfRange(SelfInfo {
                                file: target.file,
                                spec: RangeSpec::tracking(target.range),
                                kit: Some(Arc::clone(&target.kit)),
                            }),
                        )
                    } else if let Some(entry) = doc
                        .stubs()
                        .and_then(|table| table.find(&target.kit, target.range))
                    {
                        self.register(
                            target.file,
                            ElementInfo::Anchor(AnchorInfo {
                                file: target.file,
                                stub: entry.id,
                                kit: Arc::clone(&entry.kit),
                                spec: None,
                            }),
                        )
                    } else {
                        // No tree and no stub: track the range and restore
                        // once the tree is loaded.
                        self.register(
                            target.file,
                            ElementInfo::SelfRange(SelfInfo {
                                file: target.file,
                                spec: RangeSpec::tracking(target.range),
                                kit: Some(Arc::clone(&target.kit)),
                            }),
                        )
                    }
                }
                Some(VfsEntry::Binary(bin)) => {
                    match bin.stubs.find(&target.kit, target.range) {
                        Some(entry) => Pointer::unregistered(ElementInfo::Cls {
                            file: target.file,
                            stub: entry.id,
                        }),
                        None => Pointer::unregistered(ElementInfo::SelfRange(SelfInfo {
                            file: target.file,
                            spec: RangeSpec::dead(),
                            kit: Some(Arc::clone(&target.kit)),
                        })),
                    }
                }
                _ => Pointer::unregistered(ElementInfo::SelfRange(SelfInfo {
                    file: target.file,
                    spec: RangeSpec::dead(),
                    kit: Some(Arc::clone(&target.kit)),
                })),
            },
        }
    }

    /// Pointer onto a bare offset range with no structural identity; it
    /// restores to the file and reconciles like any other marker.
    pub fn create_range_pointer(&self, file: FileKey, range: TextRange) -> Pointer {
        self.create_range_pointer_with(file, RangeSpec::tracking(range))
    }

    /// Range pointer with explicit boundary and survival policy.
    pub fn create_range_pointer_with(&self, file: FileKey, spec: RangeSpec) -> Pointer {
        self.register(
            file,
            ElementInfo::SelfRange(SelfInfo {
                file,
                spec,
                kit: None,
            }),
        )
    }

    /// Pointer into an injected fragment, addressed through its host
    /// pointer plus the affix layout. Unregistered: it tracks entirely
    /// through the host.
    pub fn create_injected_pointer(
        &self,
        host: &Pointer,
        layout: InjectedLayout,
        injected_range: TextRange,
        kit: Arc<Identikit>,
    ) -> Pointer {
        Pointer::unregistered(ElementInfo::Injected(InjectedInfo {
            host: host.clone(),
            layout,
            injected_range,
            kit,
        }))
    }

    /// Drop one reference. Returns true when this was the last one and
    /// the pointer is now disposed.
    pub fn release(&self, pointer: &Pointer) -> bool {
        let remaining = pointer.inner.release();
        if remaining != 0 {
            return false;
        }
        if let Some(registry) = pointer.inner.registry().and_then(Weak::upgrade) {
            let live = registry.remove_reference(pointer.inner());
            if live == 0 {
                self.disconnect(&registry);
            }
        }
        true
    }

    /// Commit-time entry point: reconcile every tracked range in `doc`
    /// against the event batch.
    pub fn update_markers(&self, doc: &HostDocument, frozen: &FrozenDoc, events: &[DocEvent]) {
        if let Some(registry) = self.registry_for(doc.file()) {
            registry.update_markers(doc, frozen, events);
        }
    }

    /// Post-commit entry point: re-identify tracked nodes in the fresh
    /// tree.
    pub fn after_reparse(&self, doc: &HostDocument) {
        if let Some(registry) = self.registry_for(doc.file()) {
            registry.after_reparse(doc);
        }
    }

    /// Upgrade anchors into `doc` to range tracking; call after the
    /// document's tree was loaded on demand.
    pub fn fasten_belts(&self, doc: &HostDocument) {
        if let Some(registry) = self.registry_for(doc.file()) {
            registry.fasten_belts(doc);
        }
    }

    /// Sweep dropped handles in every registry and disconnect the ones
    /// left empty.
    pub fn on_low_memory(&self) {
        let registries: Vec<_> = lock(&self.registries).values().cloned().collect();
        for registry in registries {
            if registry.sweep() == 0 {
                self.disconnect(&registry);
            }
        }
    }

    /// Occupancy of one document's registry, if it exists.
    pub fn registry_stats(&self, file: FileKey) -> Option<RegistryStats> {
        self.registry_for(file).map(|registry| registry.stats())
    }

    fn register(&self, file: FileKey, info: ElementInfo) -> Pointer {
        let registry = {
            let mut map = lock(&self.registries);
            Arc::clone(
                map.entry(file)
                    .or_insert_with(|| Arc::new(DocRegistry::new(file))),
            )
        };
        Pointer::from_inner(registry.add_or_reuse(info))
    }

    fn registry_for(&self, file: FileKey) -> Option<Arc<DocRegistry>> {
        lock(&self.registries).get(&file).cloned()
    }

    /// Unmap an empty registry. Re-checks emptiness under the map lock;
    /// finding a different registry under the key is unrecoverable
    /// bookkeeping corruption.
    fn disconnect(&self, registry: &Arc<DocRegistry>) {
        let mut map = lock(&self.registries);
        if registry.stats().live > 0 {
            // A racing registration refilled it; keep it connected.
            return;
        }
        match map.remove(&registry.file()) {
            Some(existing) => assert!(
                Arc::ptr_eq(&existing, registry),
                "disconnected registry does not match the mapped one"
            ),
            None => return,
        }
        debug!(file = ?registry.file(), "disconnected empty registry");
    }
}
