use serde::{Deserialize, Serialize};
use tree_sitter::{InputEdit, Parser, Point, Tree};
use xi_rope::Rope;

use crate::host::stubs::StubTable;
use crate::host::vfs::{FileKey, LanguageId};
use crate::pointers::PointerEngine;

/// One document change: `old_len` bytes at `offset` replaced by `text`.
///
/// Events are ordered and applied strictly in sequence. `new_len()` always
/// equals `text.len()`; the text itself is carried so frozen snapshots can
/// be advanced event by event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocEvent {
    pub offset: usize,
    pub old_len: usize,
    pub text: String,
    /// Set by the host when the whole document was swapped out (external
    /// reload). Marker logic additionally applies a structural heuristic;
    /// see [`crate::pointers::marker`].
    pub whole_document_replaced: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EditError {
    #[error("edit {offset}+{old_len} out of bounds for document of length {len}")]
    OutOfBounds {
        offset: usize,
        old_len: usize,
        len: usize,
    },
}

impl DocEvent {
    pub fn replace(offset: usize, old_len: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            old_len,
            text: text.into(),
            whole_document_replaced: false,
        }
    }

    pub fn new_len(&self) -> usize {
        self.text.len()
    }

    /// End of the replaced span in pre-event coordinates.
    pub fn old_end(&self) -> usize {
        self.offset + self.old_len
    }

    /// End of the inserted span in post-event coordinates.
    pub fn new_end(&self) -> usize {
        self.offset + self.new_len()
    }
}

/// Immutable text snapshot at a known event count.
///
/// `advance` folds one event in, producing the next snapshot; the stamp
/// grows monotonically and is what the marker cache keys its work by.
#[derive(Clone, Debug)]
pub struct FrozenDoc {
    text: Rope,
    stamp: u64,
}

impl FrozenDoc {
    pub(crate) fn new(text: Rope, stamp: u64) -> Self {
        Self { text, stamp }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.len() == 0
    }

    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    pub fn to_string(&self) -> String {
        self.text.to_string()
    }

    /// Snapshot with `ev` folded in.
    pub fn advance(&self, ev: &DocEvent) -> FrozenDoc {
        let mut builder = xi_rope::delta::Builder::new(self.text.len());
        builder.replace(ev.offset..ev.old_end(), Rope::from(ev.text.as_str()));
        FrozenDoc {
            text: builder.build().apply(&self.text),
            stamp: self.stamp + 1,
        }
    }
}

/// A text document on the host side: current rope buffer, the last
/// committed snapshot with its parse tree, and the journal of pending
/// (uncommitted) events in between.
///
/// The engine core never touches the buffer directly; it sees the frozen
/// committed snapshot plus the event batch at commit time, and the
/// committed tree when restoring elements.
pub struct HostDocument {
    file: FileKey,
    language: LanguageId,
    /// Current text, pending edits applied.
    buffer: Rope,
    /// Last committed text; what `tree` was parsed from.
    committed: Rope,
    /// Total events committed since creation.
    committed_stamp: u64,
    pending: Vec<DocEvent>,
    parser: Parser,
    tree: Option<Tree>,
    /// False for stub-only documents whose tree is loaded lazily.
    tree_loaded: bool,
    stubs: Option<StubTable>,
}

impl std::fmt::Debug for HostDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostDocument")
            .field("file", &self.file)
            .field("language", &self.language)
            .field("len", &self.buffer.len())
            .field("committed_stamp", &self.committed_stamp)
            .field("pending", &self.pending.len())
            .field("tree_loaded", &self.tree_loaded)
            .finish()
    }
}

impl HostDocument {
    /// Create a parsed document (markdown grammar, the crate's test/demo
    /// language).
    pub fn from_text(language: LanguageId, text: &str) -> anyhow::Result<Self> {
        let mut doc = Self::unparsed(language, text, None)?;
        doc.load_tree();
        Ok(doc)
    }

    /// Create a document whose tree is not loaded; pointers into it anchor
    /// through `stubs` until [`HostDocument::load_tree`] is called.
    pub fn unparsed(
        language: LanguageId,
        text: &str,
        stubs: Option<StubTable>,
    ) -> anyhow::Result<Self> {
        let buffer = Rope::from(text);
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_md::LANGUAGE.into())?;
        Ok(Self {
            file: FileKey::new(),
            language,
            committed: buffer.clone(),
            buffer,
            committed_stamp: 0,
            pending: Vec::new(),
            parser,
            tree: None,
            tree_loaded: false,
            stubs,
        })
    }

    pub fn file(&self) -> FileKey {
        self.file
    }

    pub fn language(&self) -> LanguageId {
        self.language
    }

    /// Current text (pending edits included).
    pub fn text(&self) -> String {
        self.buffer.to_string()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 0
    }

    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }

    pub fn committed_stamp(&self) -> u64 {
        self.committed_stamp
    }

    /// Frozen snapshot of the last committed text.
    pub fn frozen(&self) -> FrozenDoc {
        FrozenDoc::new(self.committed.clone(), self.committed_stamp)
    }

    pub fn pending_events(&self) -> &[DocEvent] {
        &self.pending
    }

    /// Tree of the committed text, if loaded.
    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    pub fn stubs(&self) -> Option<&StubTable> {
        self.stubs.as_ref()
    }

    /// Parse the committed text now. For stub-only documents this is the
    /// "tree demanded" moment that lets anchors fasten to range tracking.
    pub fn load_tree(&mut self) {
        self.tree = self.parser.parse(self.committed.to_string(), None);
        self.tree_loaded = true;
    }

    /// Replace `old_len` bytes at `offset` with `text`. The event joins
    /// the pending journal until the next [`HostDocument::commit`].
    ///
    /// Panics on out-of-bounds edits; use [`HostDocument::try_replace`]
    /// when the coordinates come from untrusted input.
    pub fn replace(&mut self, offset: usize, old_len: usize, text: &str) {
        if let Err(err) = self.try_replace(offset, old_len, text) {
            panic!("{err}");
        }
    }

    /// Fallible variant of [`HostDocument::replace`].
    pub fn try_replace(&mut self, offset: usize, old_len: usize, text: &str) -> Result<(), EditError> {
        if offset + old_len > self.buffer.len() {
            return Err(EditError::OutOfBounds {
                offset,
                old_len,
                len: self.buffer.len(),
            });
        }
        let ev = DocEvent::replace(offset, old_len, text);
        self.apply_to_buffer(&ev);
        self.pending.push(ev);
        Ok(())
    }

    pub fn insert(&mut self, offset: usize, text: &str) {
        self.replace(offset, 0, text);
    }

    pub fn delete(&mut self, offset: usize, len: usize) {
        self.replace(offset, len, "");
    }

    /// Swap the entire document text, flagging the event as a whole
    /// document replace (external reload semantics).
    pub fn set_text(&mut self, text: &str) {
        let ev = DocEvent {
            offset: 0,
            old_len: self.buffer.len(),
            text: text.to_string(),
            whole_document_replaced: true,
        };
        self.apply_to_buffer(&ev);
        self.pending.push(ev);
    }

    fn apply_to_buffer(&mut self, ev: &DocEvent) {
        let mut builder = xi_rope::delta::Builder::new(self.buffer.len());
        builder.replace(ev.offset..ev.old_end(), Rope::from(ev.text.as_str()));
        self.buffer = builder.build().apply(&self.buffer);
    }

    /// Commit the pending event batch: fold the registry's markers, then
    /// reparse incrementally, then let the engine re-target pointers
    /// against the fresh tree.
    ///
    /// `tree.edit()` must see pre-batch coordinates, so input edits are
    /// computed from a rolling frozen snapshot before the new parse.
    pub fn commit(&mut self, engine: &PointerEngine) {
        if self.pending.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.pending);
        let frozen = self.frozen();

        engine.update_markers(self, &frozen, &events);

        if self.tree_loaded {
            let old_tree = self.tree.take().map(|mut tree| {
                let mut snapshot = frozen.clone();
                for ev in &events {
                    tree.edit(&event_to_input_edit(&snapshot, ev));
                    snapshot = snapshot.advance(ev);
                }
                tree
            });
            self.tree = self.parser.parse(self.buffer.to_string(), old_tree.as_ref());
        }

        self.committed = self.buffer.clone();
        self.committed_stamp += events.len() as u64;

        engine.after_reparse(self);
    }
}

/// Convert one event into a tree-sitter [`InputEdit`], with row/column
/// positions computed against the pre-event snapshot.
fn event_to_input_edit(snapshot: &FrozenDoc, ev: &DocEvent) -> InputEdit {
    let old_text = snapshot.to_string();
    let start = byte_to_point(&old_text, ev.offset);
    let old_end = byte_to_point(&old_text, ev.old_end());
    let new_end = if let Some(last_newline) = ev.text.rfind('\n') {
        Point {
            row: start.row + ev.text.matches('\n').count(),
            column: ev.text.len() - last_newline - 1,
        }
    } else {
        Point {
            row: start.row,
            column: start.column + ev.text.len(),
        }
    };
    InputEdit {
        start_byte: ev.offset,
        old_end_byte: ev.old_end(),
        new_end_byte: ev.new_end(),
        start_position: start,
        old_end_position: old_end,
        new_end_position: new_end,
    }
}

/// Byte offset to (row, column), clamped to the text length.
fn byte_to_point(text: &str, byte_offset: usize) -> Point {
    let bytes = text.as_bytes();
    let offset = byte_offset.min(bytes.len());
    let mut row = 0;
    let mut last_newline = 0;
    for (i, &b) in bytes.iter().enumerate().take(offset) {
        if b == b'\n' {
            row += 1;
            last_newline = i + 1;
        }
    }
    Point {
        row,
        column: offset - last_newline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lang() -> LanguageId {
        LanguageId(1)
    }

    #[test]
    fn replace_updates_buffer_and_journal() {
        let mut doc = HostDocument::from_text(lang(), "abcdef").unwrap();
        doc.replace(2, 2, "XY");
        assert_eq!(doc.text(), "abXYef");
        assert_eq!(doc.pending_events().len(), 1);
        // Committed snapshot is untouched until commit.
        assert_eq!(doc.frozen().to_string(), "abcdef");
    }

    #[test]
    fn frozen_advance_folds_events_in_order() {
        let frozen = FrozenDoc::new(Rope::from("abcdef"), 0);
        let a = frozen.advance(&DocEvent::replace(2, 0, "XYZ"));
        assert_eq!(a.to_string(), "abXYZcdef");
        assert_eq!(a.stamp(), 1);
        let b = a.advance(&DocEvent::replace(0, 2, ""));
        assert_eq!(b.to_string(), "XYZcdef");
        assert_eq!(b.stamp(), 2);
    }

    #[test]
    fn commit_advances_committed_state() {
        let engine = PointerEngine::new();
        let mut doc = HostDocument::from_text(lang(), "# Heading\n\n- Item 1").unwrap();
        doc.insert(0, "A: ");
        doc.commit(&engine);
        assert_eq!(doc.committed_stamp(), 1);
        assert!(doc.pending_events().is_empty());
        assert_eq!(doc.frozen().to_string(), "A: # Heading\n\n- Item 1");
        assert!(doc.tree().is_some());
    }

    #[test]
    fn out_of_bounds_edit_is_rejected() {
        let mut doc = HostDocument::from_text(lang(), "short").unwrap();
        let err = doc.try_replace(4, 3, "x").unwrap_err();
        assert_eq!(
            err,
            EditError::OutOfBounds {
                offset: 4,
                old_len: 3,
                len: 5
            }
        );
        assert!(doc.pending_events().is_empty());
    }

    #[test]
    fn set_text_flags_whole_replace() {
        let mut doc = HostDocument::from_text(lang(), "old content").unwrap();
        doc.set_text("entirely new");
        let ev = &doc.pending_events()[0];
        assert!(ev.whole_document_replaced);
        assert_eq!(ev.offset, 0);
        assert_eq!(ev.old_len, "old content".len());
    }

    #[test]
    fn byte_to_point_tracks_newlines() {
        let text = "Line 1\nLine 2\nLine 3";
        assert_eq!(byte_to_point(text, 0), Point { row: 0, column: 0 });
        assert_eq!(byte_to_point(text, 7), Point { row: 1, column: 0 });
        assert_eq!(byte_to_point(text, 13), Point { row: 1, column: 6 });
        assert_eq!(
            byte_to_point(text, text.len() + 100),
            Point { row: 2, column: 6 }
        );
    }

    #[test]
    fn multiline_insertion_edit_positions() {
        let snapshot = FrozenDoc::new(Rope::from("Line 1\nLine 2"), 0);
        let ev = DocEvent::replace(6, 0, "\nNew line\nAnother");
        let edit = event_to_input_edit(&snapshot, &ev);
        assert_eq!(edit.start_byte, 6);
        assert_eq!(edit.old_end_byte, 6);
        assert_eq!(edit.new_end_byte, 6 + "\nNew line\nAnother".len());
        assert_eq!(edit.start_position, Point { row: 0, column: 6 });
        assert_eq!(edit.new_end_position, Point { row: 2, column: 7 });
    }
}
