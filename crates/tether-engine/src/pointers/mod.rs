/*!
 * # Stable Pointer Core
 *
 * Long-lived references into documents that are edited and re-parsed out
 * from under them. A pointer created on a node keeps finding "the same"
 * node after arbitrary edits, for as long as a structurally equivalent
 * node still exists at the reconciled position.
 *
 * ## Architecture Overview
 *
 * ### 1. Range Reconciliation: ManualMarker
 * - Every tracked pointer owns a **`(start, end, greedy)`** marker folded
 *   through the ordered document event stream
 * - Greedy boundaries absorb insertions at the edge; non-greedy ones
 *   shift past them
 * - A deletion strictly containing a marker invalidates it for good
 *
 * ### 2. Batch Folding: MarkerCache
 * - At commit time every marker in a document is reconciled in **one
 *   pass** over the pending event batch
 * - Coincident pointers share marker slots, so a thousand pointers at
 *   one range cost one marker's arithmetic
 * - Mid-batch queries reuse the fold; a strict batch extension folds
 *   only the new events
 *
 * ### 3. Re-identification: Identikit + restore
 * - Node pointers carry an immutable **fingerprint** (node kind, token
 *   kind, language) captured at creation
 * - Restoration climbs from the leaf at the reconciled start offset,
 *   O(tree depth), and accepts the first same-extent ancestor whose
 *   fingerprint matches
 *
 * ### 4. Registries and Lifecycle
 * - One **`DocRegistry`** per document holds weak references in a slot
 *   vector that grows by half, compacts at 2x waste, and sorts lazily
 * - Pointer records are refcounted and deduplicated: re-creating a
 *   pointer to a covered target reuses the record
 * - Dropped handles are swept opportunistically (registration, low
 *   memory), not finalized
 *
 * ### 5. Beyond Plain Nodes
 * - **Anchors** hold stubs of not-yet-parsed documents and fasten to
 *   range tracking when the tree arrives
 * - **Injected** pointers live in synthesized fragment documents and map
 *   through their host pointer plus an affix layout
 * - Files, directories, binary stubs and synthetic nodes get strategies
 *   of their own, chosen once at creation
 */

pub mod fingerprint;
pub mod info;
pub mod injected;
pub mod marker;
mod marker_cache;
pub mod pointer;
pub mod range;
mod registry;
mod restore;

pub use fingerprint::Identikit;
pub use info::{Element, NodeTarget, RangeSpec};
pub use injected::{AffixFragment, InjectedLayout};
pub use marker::ManualMarker;
pub use pointer::{Pointer, PointerEngine};
pub use range::TextRange;
pub use registry::RegistryStats;
