//! Typed indices and index-keyed storage for the design arena.
mod index_trait;
mod indexed_map;
mod macros;

pub use index_trait::IndexRef;
pub use indexed_map::{IndexedMap, SecondaryMap};
