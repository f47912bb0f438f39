//! Owned variant value
//!
//! [`Value`] has exactly the layout of [`RawValue`] and owns one reference to
//! whatever block its record points at. Cloning takes another reference,
//! dropping gives it back.

use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::slice;

use super::block::{self, MapChain};
use super::native::NativeValue;
use super::raw::{BlockHeader, RawValue, ValueType};
use crate::runtime::error::{violation, Violation};

/// Dynamically typed value that can cross the engine boundary
///
/// Not `Send`: blocks are reference counted without atomics, so a value and
/// all of its copies stay on one thread.
#[repr(transparent)]
pub struct Value {
    raw: RawValue,
}

impl Value {
    /// An undefined value
    pub const fn new() -> Self {
        Value {
            raw: RawValue::UNDEFINED,
        }
    }

    /// Marshal a native value into freshly allocated blocks
    pub fn from_native(native: &NativeValue) -> Self {
        Value {
            raw: block::encode(native),
        }
    }

    /// String value from raw UTF-16 code units
    pub fn from_utf16(units: &[u16]) -> Self {
        let block = block::alloc_string(units);
        let mut raw = RawValue::UNDEFINED;
        raw.t = ValueType::String.tag();
        raw.d.block = block.as_ptr();
        Value { raw }
    }

    /// Replace the contents: clear first, then marshal `native`
    pub fn set_value(
        &mut self,
        native: &NativeValue,
    ) {
        self.clear();
        self.raw = block::encode(native);
    }

    /// Rebuild the native value; never touches a refcount
    pub fn get_value(&self) -> NativeValue {
        // Safety: self owns a reference, so every reachable block is alive
        unsafe { block::decode(&self.raw) }
    }

    /// Release the owned block, if any, and reset to undefined with unit 0.
    ///
    /// Clearing twice releases nothing the second time.
    pub fn clear(&mut self) {
        let raw = std::mem::take(&mut self.raw);
        // Safety: raw held this value's reference and is discarded afterwards
        unsafe { block::release_raw(&raw) };
    }

    pub fn value_type(&self) -> ValueType {
        self.raw.value_type()
    }

    pub fn is_undefined(&self) -> bool {
        self.value_type() == ValueType::Undefined
    }

    /// Unit/subtype tag
    pub fn units(&self) -> u32 {
        self.raw.u
    }

    pub fn set_units(
        &mut self,
        units: u32,
    ) {
        self.raw.u = units;
    }

    // ========================================================================
    // Typed access
    // ========================================================================

    #[track_caller]
    fn expect(
        &self,
        expected: ValueType,
    ) {
        let actual = self.value_type();
        if actual != expected {
            violation(
                Violation::MarshalMismatch,
                format_args!("expected {} but value is {}", expected, actual),
            );
        }
    }

    #[track_caller]
    fn block(
        &self,
        expected: ValueType,
    ) -> NonNull<BlockHeader> {
        self.expect(expected);
        // Safety: the tag was just checked to be a block kind
        unsafe { block::block_of(&self.raw) }
    }

    #[track_caller]
    pub fn as_bool(&self) -> bool {
        self.expect(ValueType::Bool);
        // Safety: Bool lives in the int slot
        unsafe { self.raw.d.int != 0 }
    }

    #[track_caller]
    pub fn as_int(&self) -> i32 {
        self.expect(ValueType::Int);
        // Safety: tag checked
        unsafe { self.raw.d.int }
    }

    #[track_caller]
    pub fn as_real(&self) -> f64 {
        self.expect(ValueType::Real);
        // Safety: tag checked
        unsafe { self.raw.d.real }
    }

    /// Code units of a string, without the terminator
    #[track_caller]
    pub fn as_utf16(&self) -> &[u16] {
        let block = self.block(ValueType::String);
        // Safety: the block stays alive while self is borrowed
        unsafe { block::string_units(block) }
    }

    /// String contents; unpaired surrogates become U+FFFD
    #[track_caller]
    pub fn as_string(&self) -> String {
        String::from_utf16_lossy(self.as_utf16())
    }

    #[track_caller]
    pub fn as_bytes(&self) -> &[u8] {
        let block = self.block(ValueType::Bytes);
        // Safety: the block stays alive while self is borrowed
        unsafe { block::bytes(block) }
    }

    /// Elements of an array
    #[track_caller]
    pub fn items(&self) -> &[Value] {
        let block = self.block(ValueType::Array);
        // Safety: Value is repr(transparent) over RawValue and the block
        // stays alive while self is borrowed
        unsafe {
            let items = block::array_items(block);
            slice::from_raw_parts(items.as_ptr().cast::<Value>(), items.len())
        }
    }

    /// Key/value pairs of a map, in chain order
    #[track_caller]
    pub fn entries(&self) -> Entries<'_> {
        self.expect(ValueType::Map);
        Entries {
            // Safety: the chain stays alive while self is borrowed
            chain: unsafe { MapChain::new(self.raw.d.map) },
            _value: PhantomData,
        }
    }

    /// Element count: code units, bytes, array items or map entries.
    /// Zero for primitives.
    pub fn len(&self) -> usize {
        match self.value_type() {
            ValueType::String | ValueType::Bytes | ValueType::Array => {
                // Safety: tag checked, block alive while self is borrowed
                unsafe { (*block::block_of(&self.raw).as_ptr()).length as usize }
            }
            ValueType::Map => self.entries().count(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reference count of the owned block; 0 when nothing is shared
    pub fn ref_count(&self) -> usize {
        // Safety: tags checked before reading pointers; blocks are alive
        unsafe {
            match self.value_type() {
                ValueType::String | ValueType::Bytes | ValueType::Array => {
                    (*block::block_of(&self.raw).as_ptr()).refs.max(0) as usize
                }
                ValueType::Map => self
                    .raw
                    .d
                    .map
                    .as_ref()
                    .map_or(0, |head| head.refs.max(0) as usize),
                _ => 0,
            }
        }
    }

    // ========================================================================
    // Engine records
    // ========================================================================

    /// Adopt a record holding one reference, e.g. an engine return value.
    ///
    /// # Safety
    /// `raw` must be a valid record whose reference is transferred to the
    /// returned value. Its blocks must carry a working release function.
    pub unsafe fn from_raw(raw: RawValue) -> Self {
        Value { raw }
    }

    /// Hand this value's reference to the engine
    pub fn into_raw(self) -> RawValue {
        let this = ManuallyDrop::new(self);
        this.raw
    }

    /// Borrow the record for an engine call that does not take ownership
    pub fn as_raw(&self) -> &RawValue {
        &self.raw
    }

    /// Record for an engine call that fills in a result.
    ///
    /// # Safety
    /// Whatever the engine writes must be a valid record owning one
    /// reference. The previous contents are overwritten without release, so
    /// the value should be undefined beforehand.
    pub unsafe fn as_mut_raw(&mut self) -> &mut RawValue {
        &mut self.raw
    }

    /// Marshal an argument vector
    pub fn from_natives(natives: &[NativeValue]) -> Vec<Value> {
        natives.iter().map(Value::from_native).collect()
    }

    /// Unmarshal an argument vector
    pub fn to_natives(values: &[Value]) -> Vec<NativeValue> {
        values.iter().map(Value::get_value).collect()
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        // Safety: self holds a reference, so the blocks are alive
        unsafe { block::retain_raw(&self.raw) };
        Value { raw: self.raw }
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        self.clear();
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::new()
    }
}

impl PartialEq for Value {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.get_value() == other.get_value()
    }
}

impl fmt::Debug for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Value")
            .field("type", &self.value_type())
            .field("units", &self.raw.u)
            .field("value", &format_args!("{}", self.get_value()))
            .finish()
    }
}

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.get_value())
    }
}

impl From<&NativeValue> for Value {
    fn from(native: &NativeValue) -> Self {
        Value::from_native(native)
    }
}

impl From<NativeValue> for Value {
    fn from(native: NativeValue) -> Self {
        Value::from_native(&native)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::from_native(&NativeValue::Bool(b))
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::from_native(&NativeValue::Int(i))
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::from_native(&NativeValue::Real(r))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        let units: Vec<u16> = s.encode_utf16().collect();
        Value::from_utf16(&units)
    }
}

impl From<&Value> for NativeValue {
    fn from(value: &Value) -> Self {
        value.get_value()
    }
}

/// Iterator over a map value's entries
pub struct Entries<'a> {
    chain: MapChain<'a>,
    _value: PhantomData<&'a Value>,
}

impl<'a> Iterator for Entries<'a> {
    type Item = (&'a Value, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.chain.next()?;
        // Safety: Value is repr(transparent) over RawValue
        unsafe {
            Some((
                &*(&node.key as *const RawValue).cast::<Value>(),
                &*(&node.value as *const RawValue).cast::<Value>(),
            ))
        }
    }
}
