//! Foreign element primitives
//!
//! The engine exposes element reference counting through a flat C function
//! table. [`ElementApi`] is the seam the scope stack calls through;
//! [`DomFunctionTable`] adapts the real table and
//! [`RecordingApi`](super::RecordingApi) stands in for it in tests.

use std::fmt;
use std::sync::Arc;

use crate::runtime::error::{BridgeError, Result};

/// Opaque element handle owned by the engine
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Handle(usize);

impl Handle {
    pub const NULL: Handle = Handle(0);

    pub const fn from_raw(raw: usize) -> Self {
        Handle(raw)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for Handle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Handle({:#x})", self.0)
    }
}

/// Status code returned by engine DOM functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomResult {
    Ok,
    InvalidHwnd,
    InvalidHandle,
    PassiveHandle,
    InvalidParameter,
    OperationFailed,
    /// Success, but the engine did not handle the request itself
    OkNotHandled,
    /// Code outside the documented set
    Other(i32),
}

impl DomResult {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => DomResult::Ok,
            1 => DomResult::InvalidHwnd,
            2 => DomResult::InvalidHandle,
            3 => DomResult::PassiveHandle,
            4 => DomResult::InvalidParameter,
            5 => DomResult::OperationFailed,
            -1 => DomResult::OkNotHandled,
            other => DomResult::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            DomResult::Ok => 0,
            DomResult::InvalidHwnd => 1,
            DomResult::InvalidHandle => 2,
            DomResult::PassiveHandle => 3,
            DomResult::InvalidParameter => 4,
            DomResult::OperationFailed => 5,
            DomResult::OkNotHandled => -1,
            DomResult::Other(code) => code,
        }
    }

    /// `Ok` and `OkNotHandled` both count as success
    pub fn is_ok(self) -> bool {
        matches!(self, DomResult::Ok | DomResult::OkNotHandled)
    }

    /// Convert into a propagated error naming the failed primitive
    pub fn into_result(
        self,
        op: &'static str,
        handle: Handle,
    ) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(BridgeError::ForeignCall {
                op,
                handle,
                status: self,
            })
        }
    }
}

impl fmt::Display for DomResult {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            DomResult::Ok => write!(f, "OK"),
            DomResult::InvalidHwnd => write!(f, "INVALID_HWND"),
            DomResult::InvalidHandle => write!(f, "INVALID_HANDLE"),
            DomResult::PassiveHandle => write!(f, "PASSIVE_HANDLE"),
            DomResult::InvalidParameter => write!(f, "INVALID_PARAMETER"),
            DomResult::OperationFailed => write!(f, "OPERATION_FAILED"),
            DomResult::OkNotHandled => write!(f, "OK_NOT_HANDLED"),
            DomResult::Other(code) => write!(f, "UNKNOWN({})", code),
        }
    }
}

/// Element reference counting supplied by the engine
///
/// Implementations may be called from any thread the engine calls back on.
pub trait ElementApi: Send + Sync {
    /// Take one reference to `handle`
    fn use_element(
        &self,
        handle: Handle,
    ) -> DomResult;

    /// Give back one reference to `handle`
    fn unuse_element(
        &self,
        handle: Handle,
    ) -> DomResult;
}

/// Shared engine API
pub type SharedApi = Arc<dyn ElementApi>;

/// Engine entry point taking an element handle
pub type ElementFn = unsafe extern "C" fn(handle: Handle) -> i32;

/// The reference counting entries of the engine's DOM function table
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DomFunctionTable {
    use_element: ElementFn,
    unuse_element: ElementFn,
}

impl DomFunctionTable {
    /// # Safety
    /// Both functions must be safe to call with any non-null handle, from
    /// any thread, for as long as the table is in use.
    pub unsafe fn new(
        use_element: ElementFn,
        unuse_element: ElementFn,
    ) -> Self {
        Self {
            use_element,
            unuse_element,
        }
    }

    pub fn into_shared(self) -> SharedApi {
        Arc::new(self)
    }
}

impl ElementApi for DomFunctionTable {
    fn use_element(
        &self,
        handle: Handle,
    ) -> DomResult {
        // Safety: guaranteed by the constructor contract
        DomResult::from_code(unsafe { (self.use_element)(handle) })
    }

    fn unuse_element(
        &self,
        handle: Handle,
    ) -> DomResult {
        // Safety: guaranteed by the constructor contract
        DomResult::from_code(unsafe { (self.unuse_element)(handle) })
    }
}

impl fmt::Debug for DomFunctionTable {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("DomFunctionTable")
            .field("use_element", &(self.use_element as usize as *const ()))
            .field("unuse_element", &(self.unuse_element as usize as *const ()))
            .finish()
    }
}
