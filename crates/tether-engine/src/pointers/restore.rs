//! Re-identification of a node at a reconciled offset range.
//!
//! After reparse the original node object is gone; what survives is the
//! marker-tracked range and the [`Identikit`] captured at pointer-creation
//! time. The climb below is O(tree depth), never O(tree size), which is
//! what keeps restoration viable at interactive latency.

use tree_sitter::{Node, Tree};

use crate::host::LanguageId;
use crate::pointers::fingerprint::Identikit;
use crate::pointers::range::TextRange;

/// Locate the node matching `kit` at `range` in `tree`.
///
/// Strategy: take the leaf at the start offset, climb ancestors while the
/// current end falls short of the target end, then walk upward through
/// same-end ancestors for the first fingerprint match. Zero-width target
/// ranges additionally retry from the previous leaf at the same boundary,
/// which handles degenerate insertion-point ranges sitting between two
/// tokens.
pub(crate) fn find_node_at_range<'t>(
    tree: &'t Tree,
    range: TextRange,
    kit: &Identikit,
    language: LanguageId,
) -> Option<Node<'t>> {
    let root = tree.root_node();
    if let Some(leaf) = leaf_at(root, range.start) {
        if let Some(found) = climb_from(leaf, range, kit, language) {
            return Some(found);
        }
    }
    if range.is_empty() && range.start > 0 {
        // Insertion point on a token boundary: the forward leaf did not
        // match, try the token ending here.
        if let Some(prev) = leaf_at(root, range.start - 1) {
            if prev.end_byte() == range.start {
                return climb_from(prev, range, kit, language);
            }
        }
    }
    None
}

fn leaf_at(root: Node<'_>, offset: usize) -> Option<Node<'_>> {
    root.descendant_for_byte_range(offset, offset)
}

fn climb_from<'t>(
    leaf: Node<'t>,
    range: TextRange,
    kit: &Identikit,
    language: LanguageId,
) -> Option<Node<'t>> {
    let mut node = leaf;
    while node.end_byte() < range.end {
        node = node.parent()?;
    }
    if node.end_byte() != range.end {
        return None;
    }
    // Walk the same-end ancestor chain for the first fingerprint match.
    loop {
        if node.start_byte() <= range.start && kit.matches_node(&node, language) {
            return Some(node);
        }
        let parent = node.parent()?;
        if parent.end_byte() != range.end {
            return None;
        }
        node = parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostDocument;

    fn doc(text: &str) -> HostDocument {
        HostDocument::from_text(LanguageId(1), text).unwrap()
    }

    fn kit_at(doc: &HostDocument, range: TextRange) -> Identikit {
        let tree = doc.tree().unwrap();
        let node = tree
            .root_node()
            .descendant_for_byte_range(range.start, range.end)
            .unwrap();
        Identikit::of_node(&node, doc.language())
    }

    #[test]
    fn refinds_node_at_original_range() {
        let d = doc("# Heading\n\n- Item 1\n- Item 2");
        let tree = d.tree().unwrap();
        let heading = tree.root_node().descendant_for_byte_range(0, 9).unwrap();
        let range = TextRange::new(heading.start_byte(), heading.end_byte());
        let kit = Identikit::of_node(&heading, d.language());

        let found = find_node_at_range(tree, range, &kit, d.language()).unwrap();
        assert_eq!(found.id(), heading.id());
    }

    #[test]
    fn fingerprint_mismatch_returns_none() {
        let d = doc("# Heading\n\n- Item 1");
        let tree = d.tree().unwrap();
        let range = TextRange::new(0, 9);
        let wrong = Identikit {
            node_kind: u16::MAX,
            token_kind: None,
            language: d.language(),
        };
        assert!(find_node_at_range(tree, range, &wrong, d.language()).is_none());
    }

    #[test]
    fn wrong_language_never_matches() {
        let d = doc("# Heading");
        let tree = d.tree().unwrap();
        let range = TextRange::new(0, 9);
        let kit = kit_at(&d, range);
        assert!(find_node_at_range(tree, range, &kit, LanguageId(99)).is_none());
    }

    #[test]
    fn climb_stops_at_matching_end() {
        let d = doc("- Item 1\n- Item 2");
        let tree = d.tree().unwrap();
        // The first list item spans up to the newline; re-find it from its
        // own fingerprint rather than the document node's.
        let item = tree.root_node().descendant_for_byte_range(2, 8).unwrap();
        let range = TextRange::new(item.start_byte(), item.end_byte());
        let kit = Identikit::of_node(&item, d.language());
        let found = find_node_at_range(tree, range, &kit, d.language()).unwrap();
        assert_eq!(found.byte_range(), item.byte_range());
        assert_eq!(found.kind_id(), item.kind_id());
    }
}
