//! C-ABI records shared with the engine
//!
//! These types mirror the engine's binary layout exactly and carry no
//! ownership semantics of their own. [`Value`](super::Value) is the owning
//! view over a [`RawValue`].

use std::fmt;
use std::mem;

use crate::runtime::error::{violation, Violation};
use crate::runtime::memory::ReleaseFn;

/// Kind tag of a value
///
/// Numeric tags match the engine's value type enumeration.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Empty value
    Undefined = 0,
    /// Boolean, stored in the integer slot
    Bool = 1,
    /// Signed 32-bit integer
    Int = 2,
    /// IEEE-754 double
    Real = 3,
    /// String of 16-bit code units
    String = 4,
    /// Array of values
    Array = 5,
    /// Map of key/value pairs
    Map = 6,
    /// Byte blob
    Bytes = 7,
}

impl ValueType {
    /// Decode a tag produced by this crate or the engine.
    ///
    /// Tags are never taken from untrusted input, so an unknown tag is a
    /// defect and aborts.
    pub fn from_tag(tag: u32) -> Self {
        match tag {
            0 => ValueType::Undefined,
            1 => ValueType::Bool,
            2 => ValueType::Int,
            3 => ValueType::Real,
            4 => ValueType::String,
            5 => ValueType::Array,
            6 => ValueType::Map,
            7 => ValueType::Bytes,
            other => violation(
                Violation::MarshalMismatch,
                format_args!("invalid value tag {}", other),
            ),
        }
    }

    /// Numeric tag
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Whether values of this kind own a reference-counted block
    pub fn owns_block(self) -> bool {
        matches!(
            self,
            ValueType::String | ValueType::Array | ValueType::Map | ValueType::Bytes
        )
    }

    /// Lowercase kind name
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Undefined => "undefined",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Real => "real",
            ValueType::String => "string",
            ValueType::Array => "array",
            ValueType::Map => "map",
            ValueType::Bytes => "bytes",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inline payload, reinterpreted per tag
#[repr(C)]
#[derive(Clone, Copy)]
pub union DataSlot {
    /// Bool and Int
    pub int: i32,
    /// Real
    pub real: f64,
    /// Whole slot, used for zeroing and debugging
    pub bits: u64,
    /// String, Array and Bytes
    pub block: *mut BlockHeader,
    /// Map (null for an empty map)
    pub map: *mut MapNode,
}

/// The value record exchanged with the engine
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawValue {
    /// Kind tag, see [`ValueType`]
    pub t: u32,
    /// Unit/subtype tag
    pub u: u32,
    /// Payload
    pub d: DataSlot,
}

impl RawValue {
    /// The undefined record (all zero)
    pub const UNDEFINED: RawValue = RawValue {
        t: 0,
        u: 0,
        d: DataSlot { bits: 0 },
    };

    /// Decoded kind tag
    pub fn value_type(&self) -> ValueType {
        ValueType::from_tag(self.t)
    }

    /// Payload bits, regardless of kind
    pub fn bits(&self) -> u64 {
        // Safety: every bit pattern is a valid u64
        unsafe { self.d.bits }
    }
}

impl Default for RawValue {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl fmt::Debug for RawValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RawValue")
            .field("t", &self.t)
            .field("u", &self.u)
            .field("d", &format_args!("{:#018x}", self.bits()))
            .finish()
    }
}

/// Header of string, byte and array blocks; the payload follows it
#[repr(C)]
#[derive(Debug)]
pub struct BlockHeader {
    /// Reference count, at least 1 while referenced
    pub refs: i32,
    /// Number of payload elements (code units, bytes or values)
    pub length: u32,
    /// Frees the block with the allocator that produced it
    pub release: ReleaseFn,
}

/// One node of a map's singly linked list
///
/// The head node's `refs` counts references to the whole map.
#[repr(C)]
#[derive(Debug)]
pub struct MapNode {
    pub key: RawValue,
    pub value: RawValue,
    pub next: *mut MapNode,
    pub release: ReleaseFn,
    pub refs: i32,
}

/// Offset of the payload from the start of a block
pub const PAYLOAD_OFFSET: usize = round_up(mem::size_of::<BlockHeader>(), 8);

const fn round_up(
    size: usize,
    align: usize,
) -> usize {
    (size + align - 1) & !(align - 1)
}

const _: () = assert!(mem::size_of::<RawValue>() == 16);
const _: () = assert!(mem::size_of::<DataSlot>() == 8);
