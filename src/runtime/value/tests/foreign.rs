//! Blocks owned by another allocator

use std::cell::Cell;
use std::ffi::c_void;

use crate::runtime::memory::{self, live_blocks};
use crate::runtime::value::block;
use crate::runtime::value::{MapKey, NativeValue, RawValue, Value, ValueType};

thread_local! {
    static FOREIGN_RELEASES: Cell<usize> = const { Cell::new(0) };
}

/// Stand-in for the engine's release function
unsafe extern "C" fn engine_release(block: *mut c_void) {
    FOREIGN_RELEASES.with(|n| n.set(n.get() + 1));
    memory::wipe(block);
}

fn foreign_releases() -> usize {
    FOREIGN_RELEASES.with(Cell::get)
}

/// A string record as the engine would hand it over
fn engine_string(text: &str) -> RawValue {
    let units: Vec<u16> = text.encode_utf16().collect();
    let block = block::alloc_string(&units);
    // Safety: fresh block, nothing else references it
    unsafe { (*block.as_ptr()).release = engine_release };
    let mut raw = RawValue::UNDEFINED;
    raw.t = ValueType::String.tag();
    raw.d.block = block.as_ptr();
    raw
}

#[test]
fn test_foreign_block_uses_its_release_function() {
    let before = live_blocks();
    let released = foreign_releases();

    // Safety: engine_string hands over its only reference
    let v = unsafe { Value::from_raw(engine_string("engine")) };
    assert_eq!(v.as_string(), "engine");

    let copy = v.clone();
    drop(v);
    assert_eq!(foreign_releases(), released);
    drop(copy);
    assert_eq!(foreign_releases(), released + 1);
    assert_eq!(live_blocks(), before);
}

#[test]
fn test_foreign_block_nested_in_local_array() {
    let released = foreign_releases();
    let items = vec![engine_string("a"), block::encode(&NativeValue::Int(2))];
    let array = block::alloc_array(items);

    let mut raw = RawValue::UNDEFINED;
    raw.t = ValueType::Array.tag();
    raw.d.block = array.as_ptr();

    // Safety: the array owns its items and raw owns the array
    let v = unsafe { Value::from_raw(raw) };
    assert_eq!(
        v.get_value(),
        NativeValue::Array(vec![NativeValue::from("a"), NativeValue::Int(2)])
    );
    drop(v);
    assert_eq!(foreign_releases(), released + 1);
}

#[test]
fn test_foreign_map_key_policy() {
    let entries = vec![
        (RawValue::UNDEFINED, block::encode(&NativeValue::Int(0))),
        (block::encode(&NativeValue::Real(1.5)), block::encode(&NativeValue::Int(1))),
        (
            block::encode(&NativeValue::Array(vec![NativeValue::Int(1)])),
            block::encode(&NativeValue::Int(2)),
        ),
        (block::encode(&NativeValue::from("k")), block::encode(&NativeValue::Int(3))),
        (block::encode(&NativeValue::from("k")), block::encode(&NativeValue::Int(4))),
    ];
    let mut raw = RawValue::UNDEFINED;
    raw.t = ValueType::Map.tag();
    raw.d.map = block::alloc_map(entries);

    // Safety: raw owns the freshly built chain
    let v = unsafe { Value::from_raw(raw) };
    assert_eq!(v.len(), 5);

    let expected = NativeValue::map_from([
        ("1.5", NativeValue::Int(1)),
        ("[1]", NativeValue::Int(2)),
        ("k", NativeValue::Int(4)),
    ]);
    assert_eq!(v.get_value(), expected);
}

#[test]
fn test_foreign_map_key_keeps_code_units() {
    let key = [0xDC00, 0x6B];
    let entries = vec![(
        block::encode(&NativeValue::Utf16(key.to_vec())),
        block::encode(&NativeValue::Int(9)),
    )];
    let mut raw = RawValue::UNDEFINED;
    raw.t = ValueType::Map.tag();
    raw.d.map = block::alloc_map(entries);

    // Safety: raw owns the freshly built chain
    let v = unsafe { Value::from_raw(raw) };
    let NativeValue::Map(map) = v.get_value() else {
        panic!("expected a map");
    };
    assert_eq!(map[&MapKey::Utf16(key.to_vec())], NativeValue::Int(9));

    let back = Value::from_native(&NativeValue::Map(map));
    let (k, _) = back.entries().next().unwrap();
    assert_eq!(k.as_utf16(), &key);
}

#[test]
fn test_engine_fills_result_record() {
    let mut out = Value::new();
    // Safety: out is undefined and receives a record owning one reference
    unsafe { *out.as_mut_raw() = engine_string("result") };
    assert_eq!(out.as_string(), "result");
}
