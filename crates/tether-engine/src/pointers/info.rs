//! Restoration strategies, one per kind of pointer target.
//!
//! The variant is chosen once, at pointer-creation time, from the target's
//! static kind; call sites never re-dispatch on runtime type inspection.
//! Each variant knows how to restore its element against the current host
//! state, report its current committed range, and compare identity with
//! another info.

use std::sync::Arc;

use crate::host::{FileKey, LanguageId, StubId, SyntheticNode, Vfs};
use crate::pointers::fingerprint::Identikit;
use crate::pointers::injected::InjectedLayout;
use crate::pointers::pointer::Pointer;
use crate::pointers::range::TextRange;
use crate::pointers::restore;

/// What a pointer resolves to: a located node, a file, a directory, or a
/// synthetic node with no physical location.
#[derive(Clone, Debug)]
pub enum Element {
    Node(NodeTarget),
    File(FileKey),
    Directory(FileKey),
    Synthetic(Arc<SyntheticNode>),
}

/// A located structural node: file, current range and fingerprint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeTarget {
    pub file: FileKey,
    pub range: TextRange,
    pub kit: Arc<Identikit>,
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Element::Node(a), Element::Node(b)) => a == b,
            (Element::File(a), Element::File(b)) => a == b,
            (Element::Directory(a), Element::Directory(b)) => a == b,
            (Element::Synthetic(a), Element::Synthetic(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Element {}

/// Range representation carried by range-tracked infos. `range == None`
/// means the info is permanently unresolvable through range
/// reconciliation; it never revives without external re-anchoring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeSpec {
    pub range: Option<TextRange>,
    pub greedy_left: bool,
    pub greedy_right: bool,
    pub survive_on_external_change: bool,
}

impl RangeSpec {
    pub fn tracking(range: TextRange) -> Self {
        Self {
            range: Some(range),
            greedy_left: false,
            greedy_right: false,
            survive_on_external_change: false,
        }
    }

    /// A spec that was never resolvable (used for targets that could not
    /// be indexed at creation time).
    pub fn dead() -> Self {
        Self {
            range: None,
            greedy_left: false,
            greedy_right: false,
            survive_on_external_change: false,
        }
    }
}

/// Physical node in a live tree: offset range plus fingerprint.
#[derive(Debug)]
pub(crate) struct SelfInfo {
    pub file: FileKey,
    pub spec: RangeSpec,
    /// `None` for bare range pointers, which restore to the file.
    pub kit: Option<Arc<Identikit>>,
}

/// Node not yet tree-loaded: held through the structural index until the
/// tree exists, then fastened to range tracking on first demand.
#[derive(Debug)]
pub(crate) struct AnchorInfo {
    pub file: FileKey,
    pub stub: StubId,
    pub kit: Arc<Identikit>,
    /// Populated once fastened; from then on the info is range-tracked.
    pub spec: Option<RangeSpec>,
}

/// Node inside an injected fragment, addressed through the host pointer
/// plus the affix layout.
#[derive(Debug)]
pub(crate) struct InjectedInfo {
    pub host: Pointer,
    pub layout: InjectedLayout,
    pub injected_range: TextRange,
    pub kit: Arc<Identikit>,
}

#[derive(Debug)]
pub(crate) enum ElementInfo {
    /// Synthetic node: strong reference, validity flag only.
    Hard { node: Arc<SyntheticNode> },
    SelfRange(SelfInfo),
    Anchor(AnchorInfo),
    File {
        file: FileKey,
        language: LanguageId,
    },
    Dir {
        dir: FileKey,
    },
    /// Compiled/binary node: structural index reference only.
    Cls {
        file: FileKey,
        stub: StubId,
    },
    Injected(InjectedInfo),
}

impl ElementInfo {
    /// The marker spec when this info participates in range tracking.
    pub(crate) fn tracked(&self) -> Option<&RangeSpec> {
        match self {
            ElementInfo::SelfRange(info) => Some(&info.spec),
            ElementInfo::Anchor(info) => info.spec.as_ref(),
            _ => None,
        }
    }

    /// Write the reconciled range back after an event batch. A `None`
    /// marks the info permanently unresolved.
    pub(crate) fn set_tracked_range(&mut self, range: Option<TextRange>) {
        match self {
            ElementInfo::SelfRange(info) => info.spec.range = range,
            ElementInfo::Anchor(AnchorInfo {
                spec: Some(spec), ..
            }) => spec.range = range,
            _ => {}
        }
    }

    /// Restore the element this info stands for, or `None` when it is
    /// gone (file unreachable, range lost, fingerprint mismatch).
    pub(crate) fn restore(&self, vfs: &Vfs) -> Option<Element> {
        match self {
            ElementInfo::Hard { node } => {
                node.is_valid().then(|| Element::Synthetic(Arc::clone(node)))
            }
            ElementInfo::SelfRange(info) => {
                let doc = vfs.document(info.file)?;
                let range = info.spec.range?;
                match &info.kit {
                    Some(kit) => {
                        let tree = doc.tree()?;
                        let node =
                            restore::find_node_at_range(tree, range, kit, doc.language())?;
                        Some(Element::Node(NodeTarget {
                            file: info.file,
                            range: TextRange::new(node.start_byte(), node.end_byte()),
                            kit: Arc::clone(kit),
                        }))
                    }
                    // Bare range pointer: the element is the file itself.
                    None => Some(Element::File(info.file)),
                }
            }
            ElementInfo::Anchor(info) => {
                let doc = vfs.document(info.file)?;
                match &info.spec {
                    Some(spec) => {
                        let range = spec.range?;
                        let tree = doc.tree()?;
                        let node = restore::find_node_at_range(
                            tree,
                            range,
                            &info.kit,
                            doc.language(),
                        )?;
                        Some(Element::Node(NodeTarget {
                            file: info.file,
                            range: TextRange::new(node.start_byte(), node.end_byte()),
                            kit: Arc::clone(&info.kit),
                        }))
                    }
                    None => {
                        let entry = doc.stubs()?.get(info.stub)?;
                        Some(Element::Node(NodeTarget {
                            file: info.file,
                            range: entry.range,
                            kit: Arc::clone(&entry.kit),
                        }))
                    }
                }
            }
            ElementInfo::File { file, .. } => {
                vfs.entry(*file).map(|_| Element::File(*file))
            }
            ElementInfo::Dir { dir } => {
                vfs.is_directory(*dir).then_some(Element::Directory(*dir))
            }
            ElementInfo::Cls { file, stub } => {
                let bin = vfs.binary(*file)?;
                let entry = bin.stubs.get(*stub)?;
                Some(Element::Node(NodeTarget {
                    file: *file,
                    range: entry.range,
                    kit: Arc::clone(&entry.kit),
                }))
            }
            ElementInfo::Injected(info) => {
                let mapped = injected_committed_range(info, vfs)?;
                Some(Element::Node(NodeTarget {
                    file: info.host.containing_file()?,
                    range: mapped,
                    kit: Arc::clone(&info.kit),
                }))
            }
        }
    }

    /// Current committed-document range of the target, where one exists.
    pub(crate) fn psi_range(&self, vfs: &Vfs) -> Option<TextRange> {
        match self {
            ElementInfo::SelfRange(info) => {
                vfs.document(info.file)?;
                info.spec.range
            }
            ElementInfo::Anchor(info) => match &info.spec {
                Some(spec) => {
                    vfs.document(info.file)?;
                    spec.range
                }
                None => {
                    let doc = vfs.document(info.file)?;
                    Some(doc.stubs()?.get(info.stub)?.range)
                }
            },
            ElementInfo::File { file, .. } => {
                let doc = vfs.document(*file)?;
                Some(TextRange::new(0, doc.committed_len()))
            }
            ElementInfo::Injected(info) => injected_committed_range(info, vfs),
            ElementInfo::Hard { .. } | ElementInfo::Dir { .. } | ElementInfo::Cls { .. } => None,
        }
    }

    /// Identity comparison between two infos, used to reuse an existing
    /// pointer instead of registering a duplicate.
    pub(crate) fn points_to_same(&self, other: &ElementInfo) -> bool {
        match (self, other) {
            (ElementInfo::Hard { node: a }, ElementInfo::Hard { node: b }) => Arc::ptr_eq(a, b),
            // Boundary and survival policy are part of the identity: two
            // pointers at one range with different policies track
            // differently and must not share a record.
            (ElementInfo::SelfRange(a), ElementInfo::SelfRange(b)) => {
                a.file == b.file
                    && a.spec.range.is_some()
                    && a.spec == b.spec
                    && kit_eq(&a.kit, &b.kit)
            }
            (ElementInfo::Anchor(a), ElementInfo::Anchor(b)) => {
                a.file == b.file && a.stub == b.stub
            }
            (ElementInfo::File { file: a, .. }, ElementInfo::File { file: b, .. }) => a == b,
            (ElementInfo::Dir { dir: a }, ElementInfo::Dir { dir: b }) => a == b,
            (
                ElementInfo::Cls { file: a, stub: sa },
                ElementInfo::Cls { file: b, stub: sb },
            ) => a == b && sa == sb,
            (ElementInfo::Injected(a), ElementInfo::Injected(b)) => {
                a.host == b.host
                    && a.injected_range == b.injected_range
                    && a.layout == b.layout
            }
            _ => false,
        }
    }
}

fn kit_eq(a: &Option<Arc<Identikit>>, b: &Option<Arc<Identikit>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        (None, None) => true,
        _ => false,
    }
}

/// Injected range mapped into committed host-document coordinates: the
/// host element's committed range anchors the layout's relative spans.
fn injected_committed_range(info: &InjectedInfo, vfs: &Vfs) -> Option<TextRange> {
    let host_range = info.host.psi_range(vfs)?;
    map_into_host(&info.layout, info.injected_range, host_range)
}

/// Shift a layout-relative mapping into absolute host coordinates,
/// clamped into the host element's span.
pub(crate) fn map_into_host(
    layout: &InjectedLayout,
    injected: TextRange,
    host_range: TextRange,
) -> Option<TextRange> {
    let relative = layout.host_range(injected)?;
    let start = (host_range.start + relative.start).min(host_range.end);
    let end = (host_range.start + relative.end).min(host_range.end);
    Some(TextRange::new(start, end.max(start)))
}
