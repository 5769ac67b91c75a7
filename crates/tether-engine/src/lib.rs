pub mod host;
pub mod pointers;

mod util;

// Re-export key types for easier usage
pub use host::{DocEvent, FileKey, FrozenDoc, HostDocument, LanguageId, StubTable, Vfs};
pub use pointers::{
    Element, Identikit, InjectedLayout, Pointer, PointerEngine, TextRange,
};
