//! Structural fingerprints used to re-identify nodes after reparse.
//!
//! An [`Identikit`] is an immutable signature `(node kind, token kind,
//! language)` captured when a pointer is created. After an arbitrary number
//! of edits and reparses the original node object is gone; the fingerprint
//! lets the restore path decide whether a candidate node at the reconciled
//! offset range is "the same kind of thing" the caller pointed at,
//! independent of object identity.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tree_sitter::Node;

use crate::host::LanguageId;
use crate::util::lock;

/// Immutable structural signature of a pointer target.
///
/// Equality is field-wise; interned kits are additionally pointer-equal,
/// which keeps the many coincident pointers an IDE session accumulates from
/// duplicating the same signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Identikit {
    /// Grammar kind id of the target node.
    pub node_kind: u16,
    /// Kind id of the leaf token, when the target is itself a token.
    pub token_kind: Option<u16>,
    /// Host-assigned id of the owning language.
    pub language: LanguageId,
}

static INTERN: Lazy<Mutex<HashSet<Arc<Identikit>>>> = Lazy::new(|| Mutex::new(HashSet::new()));

impl Identikit {
    /// Capture the fingerprint of a live tree node.
    pub fn of_node(node: &Node<'_>, language: LanguageId) -> Self {
        let token_kind = (node.child_count() == 0).then(|| node.kind_id());
        Self {
            node_kind: node.kind_id(),
            token_kind,
            language,
        }
    }

    /// Intern the kit, returning the shared deduplicated instance.
    pub fn intern(self) -> Arc<Identikit> {
        let mut table = lock(&INTERN);
        if let Some(existing) = table.get(&self) {
            Arc::clone(existing)
        } else {
            let arc = Arc::new(self);
            table.insert(Arc::clone(&arc));
            arc
        }
    }

    /// Whether a candidate node matches this fingerprint.
    pub fn matches_node(&self, node: &Node<'_>, language: LanguageId) -> bool {
        *self == Identikit::of_node(node, language)
    }
}
