//! Values crossing into and out of a simulated engine

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::ptr;

use serde_json::json;
use uibridge::runtime::memory::live_blocks;
use uibridge::runtime::value::{BlockHeader, DataSlot, PAYLOAD_OFFSET};
use uibridge::{MapKey, NativeValue, RawValue, Value, ValueType};

thread_local! {
    static ENGINE_FREES: Cell<usize> = const { Cell::new(0) };
}

fn engine_frees() -> usize {
    ENGINE_FREES.with(Cell::get)
}

fn string_layout(len: usize) -> Layout {
    Layout::from_size_align(PAYLOAD_OFFSET + (len + 1) * 2, 8).unwrap()
}

/// The engine's own release function for string blocks
unsafe extern "C" fn engine_free_string(block: *mut c_void) {
    let len = (*block.cast::<BlockHeader>()).length as usize;
    dealloc(block.cast(), string_layout(len));
    ENGINE_FREES.with(|n| n.set(n.get() + 1));
}

/// A string allocated the way the engine allocates it
fn engine_string(text: &str) -> RawValue {
    let units: Vec<u16> = text.encode_utf16().collect();
    // Safety: the layout covers the header, the units and a terminator
    unsafe {
        let block = alloc_zeroed(string_layout(units.len()));
        let header = block.cast::<BlockHeader>();
        header.write(BlockHeader {
            refs: 1,
            length: units.len() as u32,
            release: engine_free_string,
        });
        ptr::copy_nonoverlapping(
            units.as_ptr(),
            block.add(PAYLOAD_OFFSET).cast::<u16>(),
            units.len(),
        );
        RawValue {
            t: ValueType::String.tag(),
            u: 0,
            d: DataSlot { block: header },
        }
    }
}

/// Engine entry point filling an out-parameter
unsafe extern "C" fn engine_get_text(out: *mut RawValue) -> i32 {
    out.write(engine_string("from engine"));
    0
}

/// Engine entry point reading an argument vector
unsafe extern "C" fn engine_sum(
    argv: *const RawValue,
    argc: usize,
) -> i32 {
    std::slice::from_raw_parts(argv, argc)
        .iter()
        .filter(|v| v.t == ValueType::Int.tag())
        .map(|v| v.d.int)
        .sum()
}

/// Engine-side attribute store that retains what it keeps
#[derive(Default)]
struct EngineStore {
    kept: RefCell<Vec<RawValue>>,
}

impl EngineStore {
    unsafe fn keep(
        &self,
        raw: &RawValue,
    ) {
        if raw.t == ValueType::String.tag() {
            (*raw.d.block).refs += 1;
        }
        self.kept.borrow_mut().push(*raw);
    }

    unsafe fn text(
        &self,
        index: usize,
    ) -> String {
        let raw = self.kept.borrow()[index];
        let header = raw.d.block;
        let units = std::slice::from_raw_parts(
            header.cast::<u8>().add(PAYLOAD_OFFSET).cast::<u16>(),
            (*header).length as usize,
        );
        String::from_utf16(units).unwrap()
    }

    unsafe fn release_all(&self) {
        for raw in self.kept.borrow_mut().drain(..) {
            if raw.t == ValueType::String.tag() {
                let header = raw.d.block;
                (*header).refs -= 1;
                if (*header).refs == 0 {
                    ((*header).release)(header.cast());
                }
            }
        }
    }
}

#[test]
fn test_engine_result_is_freed_by_engine() {
    let blocks = live_blocks();
    let frees = engine_frees();

    let mut out = Value::new();
    // Safety: out is undefined and the engine writes an owned record
    let status = unsafe { engine_get_text(out.as_mut_raw()) };
    assert_eq!(status, 0);
    assert_eq!(out.as_string(), "from engine");

    let copy = out.clone();
    drop(out);
    assert_eq!(engine_frees(), frees);
    drop(copy);

    assert_eq!(engine_frees(), frees + 1);
    assert_eq!(live_blocks(), blocks);
}

#[test]
fn test_engine_keeps_rust_value_alive() {
    let blocks = live_blocks();
    let store = EngineStore::default();

    let title = Value::from("window title");
    // Safety: title is alive for the call and the store retains it
    unsafe { store.keep(title.as_raw()) };
    assert_eq!(title.ref_count(), 2);
    drop(title);

    assert_eq!(live_blocks(), blocks + 1);
    // Safety: the store still holds a reference
    assert_eq!(unsafe { store.text(0) }, "window title");

    // Safety: releases exactly the references taken by keep
    unsafe { store.release_all() };
    assert_eq!(live_blocks(), blocks);
}

#[test]
fn test_argument_vector() {
    let args = Value::from_natives(&[
        NativeValue::Int(2),
        NativeValue::from("skip"),
        NativeValue::Int(40),
    ]);
    // Safety: Value has the record layout and args outlives the call
    let sum = unsafe { engine_sum(args.as_ptr().cast::<RawValue>(), args.len()) };
    assert_eq!(sum, 42);
}

#[test]
fn test_into_raw_ownership_transfer() {
    let blocks = live_blocks();
    let store = EngineStore::default();

    let raw = Value::from("handed over").into_raw();
    // Safety: the store takes its own reference; raw's reference is dropped below
    unsafe { store.keep(&raw) };
    // Safety: give back the reference into_raw handed out
    drop(unsafe { Value::from_raw(raw) });

    // Safety: the store still holds its reference
    assert_eq!(unsafe { store.text(0) }, "handed over");
    unsafe { store.release_all() };
    assert_eq!(live_blocks(), blocks);
}

#[test]
fn test_json_document_round_trip() {
    let doc = json!({
        "id": "main",
        "size": [640, 480],
        "ratio": 1.5,
        "visible": true,
        "parent": null,
        "style": { "color": "red", "margins": [] }
    });

    let native = NativeValue::from_json(&doc);
    let value = Value::from_native(&native);
    assert_eq!(value.value_type(), ValueType::Map);
    assert_eq!(value.len(), 6);

    let back = value.get_value();
    assert_eq!(back, native);
    assert_eq!(back.to_json(), doc);

    let NativeValue::Map(map) = back else {
        panic!("expected a map");
    };
    assert_eq!(map[&MapKey::from("parent")], NativeValue::Undefined);
    assert_eq!(map[&MapKey::from("ratio")], NativeValue::Real(1.5));
}

#[test]
fn test_json_numbers_outside_i32_become_real() {
    assert_eq!(
        NativeValue::from_json(&json!(5_000_000_000i64)),
        NativeValue::Real(5_000_000_000.0)
    );
    assert_eq!(NativeValue::from_json(&json!(-7)), NativeValue::Int(-7));
    assert_eq!(NativeValue::from_json(&json!(2.0)), NativeValue::Real(2.0));
}

#[test]
fn test_bytes_and_non_finite_json() {
    let native = NativeValue::Array(vec![
        NativeValue::Bytes(vec![1, 2]),
        NativeValue::Real(f64::NAN),
        NativeValue::Undefined,
    ]);
    assert_eq!(native.to_json(), json!([[1, 2], null, null]));
}
