//! Reference-counted payload blocks
//!
//! Each function here works on raw records and moves references around
//! explicitly: `encode` returns a record owning one reference to each block
//! it created, `release_raw` gives one reference back, `retain_raw` takes one
//! more. Nothing here is thread-safe; a record and its blocks stay on the
//! thread that uses them.

use std::ffi::c_void;
use std::ptr::{self, NonNull};
use std::slice;

use tracing::trace;

use super::native::{MapKey, NativeMap, NativeValue};
use super::raw::{BlockHeader, DataSlot, MapNode, RawValue, ValueType, PAYLOAD_OFFSET};
use crate::runtime::memory::{self, release_with, MemoryLayout};

fn block_length(len: usize) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic!("block length {} exceeds u32::MAX", len))
}

fn payload_size<T>(count: usize) -> usize {
    count
        .checked_mul(std::mem::size_of::<T>())
        .and_then(|bytes| bytes.checked_add(PAYLOAD_OFFSET))
        .unwrap_or_else(|| panic!("block of {} elements exceeds the address space", count))
}

/// Allocate a block with refcount 1 and room for `capacity` elements of `T`
fn new_block<T>(
    length: usize,
    capacity: usize,
) -> NonNull<BlockHeader> {
    let length = block_length(length);
    let block = memory::allocate(payload_size::<T>(capacity)).cast::<BlockHeader>();
    // Safety: the allocation is large enough and aligned for the header
    unsafe {
        block.as_ptr().write(BlockHeader {
            refs: 1,
            length,
            release: memory::wipe,
        });
    }
    block
}

/// Pointer to the first payload element
///
/// # Safety
/// `block` must point to a live block header.
pub(crate) unsafe fn payload<T>(block: NonNull<BlockHeader>) -> *mut T {
    block.as_ptr().cast::<u8>().add(PAYLOAD_OFFSET).cast::<T>()
}

/// String block: `units.len()` code units followed by one zero unit
pub(crate) fn alloc_string(units: &[u16]) -> NonNull<BlockHeader> {
    let block = new_block::<u16>(units.len(), units.len() + 1);
    // Safety: the block has room for len + 1 units; the terminator is zeroed
    unsafe {
        ptr::copy_nonoverlapping(units.as_ptr(), payload::<u16>(block), units.len());
    }
    block
}

pub(crate) fn alloc_bytes(bytes: &[u8]) -> NonNull<BlockHeader> {
    let block = new_block::<u8>(bytes.len(), bytes.len());
    // Safety: the block has room for len bytes
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), payload::<u8>(block), bytes.len());
    }
    block
}

/// Array block taking over the references held by `items`
pub(crate) fn alloc_array(items: Vec<RawValue>) -> NonNull<BlockHeader> {
    let block = new_block::<RawValue>(items.len(), items.len());
    // Safety: the block has room for len records
    unsafe {
        ptr::copy_nonoverlapping(items.as_ptr(), payload::<RawValue>(block), items.len());
    }
    block
}

/// Map chain taking over the references held by `entries`; null when empty
pub(crate) fn alloc_map(entries: Vec<(RawValue, RawValue)>) -> *mut MapNode {
    let mut head: *mut MapNode = ptr::null_mut();
    let mut tail: *mut MapNode = ptr::null_mut();

    for (key, value) in entries {
        let node = memory::allocate(MemoryLayout::new::<MapNode>().size()).cast::<MapNode>();
        // Safety: fresh allocation sized and aligned for a node
        unsafe {
            node.as_ptr().write(MapNode {
                key,
                value,
                next: ptr::null_mut(),
                release: memory::wipe,
                refs: 1,
            });
            if tail.is_null() {
                head = node.as_ptr();
            } else {
                (*tail).next = node.as_ptr();
            }
        }
        tail = node.as_ptr();
    }

    head
}

/// # Safety
/// `block` must be a live string block.
pub(crate) unsafe fn string_units<'a>(block: NonNull<BlockHeader>) -> &'a [u16] {
    slice::from_raw_parts(payload::<u16>(block), (*block.as_ptr()).length as usize)
}

/// # Safety
/// `block` must be a live byte block.
pub(crate) unsafe fn bytes<'a>(block: NonNull<BlockHeader>) -> &'a [u8] {
    slice::from_raw_parts(payload::<u8>(block), (*block.as_ptr()).length as usize)
}

/// # Safety
/// `block` must be a live array block.
pub(crate) unsafe fn array_items<'a>(block: NonNull<BlockHeader>) -> &'a [RawValue] {
    slice::from_raw_parts(payload::<RawValue>(block), (*block.as_ptr()).length as usize)
}

/// Block pointer of a String/Array/Bytes record
///
/// # Safety
/// The record's tag must be one of the block kinds.
pub(crate) unsafe fn block_of(raw: &RawValue) -> NonNull<BlockHeader> {
    NonNull::new(raw.d.block).unwrap_or_else(|| {
        panic!("{} value without a block", ValueType::from_tag(raw.t))
    })
}

/// Take one more reference to whatever `raw` owns.
///
/// # Safety
/// `raw` must be a valid record whose blocks are alive.
pub(crate) unsafe fn retain_raw(raw: &RawValue) {
    match raw.value_type() {
        ValueType::Undefined | ValueType::Bool | ValueType::Int | ValueType::Real => {}
        ValueType::String | ValueType::Array | ValueType::Bytes => {
            let block = block_of(raw).as_ptr();
            debug_assert!((*block).refs > 0, "retain of a dead block");
            (*block).refs += 1;
        }
        ValueType::Map => {
            let head = raw.d.map;
            if !head.is_null() {
                debug_assert!((*head).refs > 0, "retain of a dead map");
                (*head).refs += 1;
            }
        }
    }
}

/// Give back one reference owned by `raw`, freeing blocks that drop to zero.
///
/// # Safety
/// `raw` must own the reference it gives back; it must not be used as an
/// owner afterwards.
pub(crate) unsafe fn release_raw(raw: &RawValue) {
    match raw.value_type() {
        ValueType::Undefined | ValueType::Bool | ValueType::Int | ValueType::Real => {}
        ValueType::String | ValueType::Bytes => {
            let block = block_of(raw);
            if drop_ref(block) {
                free_block(block);
            }
        }
        ValueType::Array => {
            let block = block_of(raw);
            if drop_ref(block) {
                for item in array_items(block) {
                    release_raw(item);
                }
                free_block(block);
            }
        }
        ValueType::Map => release_map(raw.d.map),
    }
}

/// Decrement and report whether this was the last reference
unsafe fn drop_ref(block: NonNull<BlockHeader>) -> bool {
    let header = block.as_ptr();
    debug_assert!((*header).refs > 0, "release of a dead block");
    (*header).refs -= 1;
    (*header).refs <= 0
}

unsafe fn free_block(block: NonNull<BlockHeader>) {
    let release = (*block.as_ptr()).release;
    trace!(length = (*block.as_ptr()).length, "freeing block");
    release_with(release, block.as_ptr().cast::<c_void>());
}

unsafe fn release_map(head: *mut MapNode) {
    if head.is_null() {
        return;
    }
    debug_assert!((*head).refs > 0, "release of a dead map");
    (*head).refs -= 1;
    if (*head).refs > 0 {
        return;
    }

    let mut node = head;
    while !node.is_null() {
        let next = (*node).next;
        release_raw(&(*node).key);
        release_raw(&(*node).value);
        trace!("freeing map node");
        release_with((*node).release, node.cast::<c_void>());
        node = next;
    }
}

/// Iterator over a map chain
pub(crate) struct MapChain<'a> {
    node: *const MapNode,
    _chain: std::marker::PhantomData<&'a MapNode>,
}

impl<'a> MapChain<'a> {
    /// # Safety
    /// `head` must be null or the head of a live chain outliving `'a`.
    pub(crate) unsafe fn new(head: *const MapNode) -> Self {
        Self {
            node: head,
            _chain: std::marker::PhantomData,
        }
    }
}

impl<'a> Iterator for MapChain<'a> {
    type Item = &'a MapNode;

    fn next(&mut self) -> Option<Self::Item> {
        // Safety: guaranteed live by the constructor contract
        let node = unsafe { self.node.as_ref()? };
        self.node = node.next;
        Some(node)
    }
}

// ============================================================================
// Native <-> record conversion
// ============================================================================

fn int_record(
    t: ValueType,
    value: i32,
) -> RawValue {
    let mut raw = RawValue::UNDEFINED;
    raw.t = t.tag();
    raw.d.int = value;
    raw
}

fn block_record(
    t: ValueType,
    block: NonNull<BlockHeader>,
) -> RawValue {
    RawValue {
        t: t.tag(),
        u: 0,
        d: DataSlot {
            block: block.as_ptr(),
        },
    }
}

/// Build a record owning freshly allocated blocks for `native`
pub(crate) fn encode(native: &NativeValue) -> RawValue {
    match native {
        NativeValue::Undefined => RawValue::UNDEFINED,
        NativeValue::Bool(b) => int_record(ValueType::Bool, i32::from(*b)),
        NativeValue::Int(i) => int_record(ValueType::Int, *i),
        NativeValue::Real(r) => RawValue {
            t: ValueType::Real.tag(),
            u: 0,
            d: DataSlot { real: *r },
        },
        NativeValue::String(s) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            block_record(ValueType::String, alloc_string(&units))
        }
        NativeValue::Utf16(units) => block_record(ValueType::String, alloc_string(units)),
        NativeValue::Bytes(b) => block_record(ValueType::Bytes, alloc_bytes(b)),
        NativeValue::Array(items) => {
            let records = items.iter().map(encode).collect();
            block_record(ValueType::Array, alloc_array(records))
        }
        NativeValue::Map(map) => {
            let entries = map
                .iter()
                .map(|(key, value)| (encode(&key.to_native()), encode(value)))
                .collect();
            RawValue {
                t: ValueType::Map.tag(),
                u: 0,
                d: DataSlot {
                    map: alloc_map(entries),
                },
            }
        }
    }
}

/// Rebuild a native value without touching any refcount
///
/// # Safety
/// `raw` must be a valid record whose blocks are alive.
pub(crate) unsafe fn decode(raw: &RawValue) -> NativeValue {
    match raw.value_type() {
        ValueType::Undefined => NativeValue::Undefined,
        ValueType::Bool => NativeValue::Bool(raw.d.int != 0),
        ValueType::Int => NativeValue::Int(raw.d.int),
        ValueType::Real => NativeValue::Real(raw.d.real),
        ValueType::String => NativeValue::from_utf16(string_units(block_of(raw))),
        ValueType::Bytes => NativeValue::Bytes(bytes(block_of(raw)).to_vec()),
        ValueType::Array => {
            NativeValue::Array(array_items(block_of(raw)).iter().map(|item| decode(item)).collect())
        }
        ValueType::Map => {
            let mut map = NativeMap::new();
            for node in MapChain::new(raw.d.map) {
                if let Some(key) = MapKey::from_native(decode(&node.key)) {
                    map.insert(key, decode(&node.value));
                }
            }
            NativeValue::Map(map)
        }
    }
}
