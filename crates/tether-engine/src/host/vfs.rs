use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::host::document::HostDocument;
use crate::host::stubs::StubTable;

/// Identity of a virtual file (or directory) independent of its content.
///
/// Pointers survive the file's text being rewritten wholesale; they do not
/// survive the file itself disappearing from the [`Vfs`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct FileKey(Uuid);

impl FileKey {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Host-assigned id of a language/grammar. Part of every fingerprint so a
/// node from one language never re-identifies as a node of another.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct LanguageId(pub u16);

/// A synthetic, non-physical node: it has no offsets in any document, only
/// an explicit validity flag its creator flips when the node dies.
#[derive(Debug)]
pub struct SyntheticNode {
    pub language: LanguageId,
    pub name: String,
    valid: AtomicBool,
}

impl SyntheticNode {
    pub fn new(language: LanguageId, name: impl Into<String>) -> Self {
        Self {
            language,
            name: name.into(),
            valid: AtomicBool::new(true),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Permanently invalidate the node. Pointers holding it resolve to
    /// `None` from here on.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

/// Compiled/binary content: no document, no tree, only a structural index.
#[derive(Debug)]
pub struct BinaryFile {
    pub language: LanguageId,
    pub stubs: StubTable,
}

#[derive(Debug)]
pub struct DirectoryEntry {
    pub name: String,
}

/// One entry in the virtual file table.
#[derive(Debug)]
pub enum VfsEntry {
    Document(HostDocument),
    Binary(BinaryFile),
    Directory(DirectoryEntry),
}

/// The virtual file table: everything pointers can target, keyed by
/// identity. Removing an entry makes pointers into it resolve to `None`;
/// the callers are expected to null-check.
#[derive(Debug, Default)]
pub struct Vfs {
    entries: HashMap<FileKey, VfsEntry>,
}

impl Vfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under its own key.
    pub fn add_document(&mut self, doc: HostDocument) -> FileKey {
        let key = doc.file();
        self.entries.insert(key, VfsEntry::Document(doc));
        key
    }

    pub fn add_binary(&mut self, language: LanguageId, stubs: StubTable) -> FileKey {
        let key = FileKey::new();
        self.entries
            .insert(key, VfsEntry::Binary(BinaryFile { language, stubs }));
        key
    }

    pub fn add_directory(&mut self, name: impl Into<String>) -> FileKey {
        let key = FileKey::new();
        self.entries.insert(
            key,
            VfsEntry::Directory(DirectoryEntry { name: name.into() }),
        );
        key
    }

    pub fn entry(&self, key: FileKey) -> Option<&VfsEntry> {
        self.entries.get(&key)
    }

    pub fn document(&self, key: FileKey) -> Option<&HostDocument> {
        match self.entries.get(&key) {
            Some(VfsEntry::Document(doc)) => Some(doc),
            _ => None,
        }
    }

    pub fn document_mut(&mut self, key: FileKey) -> Option<&mut HostDocument> {
        match self.entries.get_mut(&key) {
            Some(VfsEntry::Document(doc)) => Some(doc),
            _ => None,
        }
    }

    pub fn binary(&self, key: FileKey) -> Option<&BinaryFile> {
        match self.entries.get(&key) {
            Some(VfsEntry::Binary(bin)) => Some(bin),
            _ => None,
        }
    }

    pub fn is_directory(&self, key: FileKey) -> bool {
        matches!(self.entries.get(&key), Some(VfsEntry::Directory(_)))
    }

    /// Delete an entry. Existing pointers into it degrade to `None`.
    pub fn remove(&mut self, key: FileKey) -> Option<VfsEntry> {
        self.entries.remove(&key)
    }
}
