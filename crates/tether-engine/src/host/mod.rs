/*!
 * Host collaborator surface.
 *
 * The pointer engine does not parse and does not own document text; it
 * consumes a small set of host abilities:
 *
 * - **`document`**: the ordered [`DocEvent`] stream, [`FrozenDoc`]
 *   snapshots and the committed-vs-current distinction, backed by an
 *   xi-rope buffer with a tree-sitter tree over the committed text.
 * - **`vfs`**: virtual-file identity ([`FileKey`]) and the file table;
 *   an entry disappearing degrades pointers into it to `None`.
 * - **`stubs`**: structural indices for content whose tree is not loaded
 *   (lazy documents, compiled/binary files).
 *
 * Everything here is deliberately minimal; a real IDE host would supply
 * richer implementations behind the same shapes.
 */

pub mod document;
pub mod stubs;
pub mod vfs;

pub use document::{DocEvent, EditError, FrozenDoc, HostDocument};
pub use stubs::{StubEntry, StubId, StubTable};
pub use vfs::{BinaryFile, DirectoryEntry, FileKey, LanguageId, SyntheticNode, Vfs, VfsEntry};
