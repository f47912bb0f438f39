//! Variant values exchanged with the UI engine
//!
//! A [`Value`] is a tagged 16-byte record. Primitives live inline; strings,
//! byte blobs, arrays and maps point at reference-counted blocks that are
//! freed through the release function stored in the block, so blocks made by
//! the engine's allocator and blocks made here can be mixed freely.
//!
//! [`NativeValue`] is the Rust-side counterpart used to build and inspect
//! values without touching engine memory.

mod block;
pub mod native;
pub mod raw;
pub mod variant;

pub use native::{MapKey, NativeMap, NativeValue};
pub use raw::{BlockHeader, DataSlot, MapNode, RawValue, ValueType, PAYLOAD_OFFSET};
pub use variant::{Entries, Value};

#[cfg(test)]
mod tests;
