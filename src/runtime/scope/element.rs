//! Element wrappers
//!
//! An [`Element`] is the local proxy for a handle while some open scope
//! protects it. An [`ElementRef`] protects a handle on its own, independently
//! of any scope.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::{trace, warn};

use super::foreign::{Handle, SharedApi};
use crate::runtime::error::{violation, Result, Violation};

struct ElementInner {
    handle: Handle,
    dropped: Cell<bool>,
}

/// Proxy for a handle protected by a scope
///
/// Clones share one wrapper. Once the owning scope closes the wrapper is
/// dropped and reading its handle is a protocol violation.
#[derive(Clone)]
pub struct Element {
    inner: Rc<ElementInner>,
}

impl Element {
    pub(crate) fn new(handle: Handle) -> Self {
        Element {
            inner: Rc::new(ElementInner {
                handle,
                dropped: Cell::new(false),
            }),
        }
    }

    /// Wrapper for `handle` in the current scope.
    ///
    /// Reuses the wrapper of any enclosing scope that already protects the
    /// handle; otherwise the current scope takes a new engine reference.
    pub fn wrap(handle: Handle) -> Result<Element> {
        super::get_or_create(handle)
    }

    #[track_caller]
    pub fn handle(&self) -> Handle {
        if self.inner.dropped.get() {
            violation(
                Violation::Protocol,
                format_args!("element {} used after its scope closed", self.inner.handle),
            );
        }
        self.inner.handle
    }

    pub fn is_dropped(&self) -> bool {
        self.inner.dropped.get()
    }

    /// Whether both point at the same wrapper
    pub fn ptr_eq(
        &self,
        other: &Element,
    ) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn raw_handle(&self) -> Handle {
        self.inner.handle
    }

    pub(crate) fn mark_dropped(&self) {
        self.inner.dropped.set(true);
    }
}

impl fmt::Debug for Element {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Element")
            .field("handle", &self.inner.handle)
            .field("dropped", &self.inner.dropped.get())
            .finish()
    }
}

/// Persistent element reference
///
/// Holds exactly one engine reference from construction until
/// [`release`](ElementRef::release) or drop.
pub struct ElementRef {
    handle: Handle,
    api: SharedApi,
    released: bool,
}

impl ElementRef {
    /// Take a new engine reference to `element`'s handle, using the current
    /// scope's API
    #[track_caller]
    pub fn new(element: &Element) -> Result<Self> {
        let handle = element.handle();
        let api = super::current_api();
        api.use_element(handle).into_result("use_element", handle)?;
        trace!(%handle, "persistent reference taken");
        Ok(ElementRef {
            handle,
            api,
            released: false,
        })
    }

    /// Adopt a reference the engine already counted for us.
    ///
    /// # Safety
    /// The caller must own one reference to `handle` obtained from `api`; it
    /// is released through `api` exactly once.
    #[track_caller]
    pub unsafe fn attach(
        api: SharedApi,
        handle: Handle,
    ) -> Self {
        if handle.is_null() {
            violation(Violation::Protocol, "null handle attached");
        }
        ElementRef {
            handle,
            api,
            released: false,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Wrapper for the handle in the current scope
    pub fn element(&self) -> Result<Element> {
        Element::wrap(self.handle)
    }

    /// Give the reference back, reporting a failed release
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.api
            .unuse_element(self.handle)
            .into_result("unuse_element", self.handle)
    }
}

impl Drop for ElementRef {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let status = self.api.unuse_element(self.handle);
        if !status.is_ok() {
            warn!(handle = %self.handle, %status, "persistent reference release failed");
        }
    }
}

impl fmt::Debug for ElementRef {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ElementRef")
            .field("handle", &self.handle)
            .finish()
    }
}
