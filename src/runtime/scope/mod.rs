//! Handle scope stack
//!
//! Every thread owns a stack of nested scopes. A scope protects the engine
//! handles looked up while it is the innermost one: the first lookup of a
//! handle anywhere on the stack takes one engine reference, and closing the
//! scope that took it gives it back. Enclosing scopes are searched before a
//! new reference is taken, so a handle is counted at most once per stack.
//!
//! ```ignore
//! let api = RecordingApi::shared();
//! let outer = HandleScope::open_with(api.clone());
//! let body = Element::wrap(Handle::from_raw(0xAAAA))?;
//! {
//!     let _inner = HandleScope::open();
//!     assert!(Element::wrap(body.handle())?.ptr_eq(&body));
//! }
//! outer.close()?;
//! ```
//!
//! Scopes must close in reverse order of opening. Anything else is a
//! protocol violation.

mod element;
mod foreign;
mod frame;
mod recording;

pub use element::{Element, ElementRef};
pub use foreign::{DomFunctionTable, DomResult, ElementApi, ElementFn, Handle, SharedApi};
pub use frame::INLINE_SLOTS;
pub use recording::{ApiEvent, ApiOp, RecordingApi};

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use crate::runtime::error::{violation, BridgeError, Result, Violation};
use frame::ScopeFrame;

/// Default for [`set_large_scope_warning`]
pub const DEFAULT_LARGE_SCOPE_WARNING: usize = 64;

static DEFAULT_API: Lazy<RwLock<Option<SharedApi>>> = Lazy::new(|| RwLock::new(None));

static LARGE_SCOPE_WARNING: AtomicUsize = AtomicUsize::new(DEFAULT_LARGE_SCOPE_WARNING);

struct ScopeStack {
    frames: SmallVec<[ScopeFrame; 8]>,
    next_id: u64,
}

thread_local! {
    static STACK: RefCell<ScopeStack> = RefCell::new(ScopeStack {
        frames: SmallVec::new(),
        next_id: 1,
    });
}

/// Install the API used by scopes opened without an enclosing scope.
///
/// Returns the previously installed API.
pub fn install_default_api(api: SharedApi) -> Option<SharedApi> {
    DEFAULT_API.write().replace(api)
}

pub fn clear_default_api() -> Option<SharedApi> {
    DEFAULT_API.write().take()
}

pub fn default_api() -> Option<SharedApi> {
    DEFAULT_API.read().clone()
}

/// Scopes owning more handles than `limit` log one warning; 0 disables
pub fn set_large_scope_warning(limit: usize) {
    LARGE_SCOPE_WARNING.store(limit, Ordering::Relaxed);
}

pub fn large_scope_warning() -> usize {
    LARGE_SCOPE_WARNING.load(Ordering::Relaxed)
}

/// API of the innermost scope on this thread
#[track_caller]
pub(crate) fn current_api() -> SharedApi {
    let api = STACK.with(|stack| stack.borrow().frames.last().map(|f| f.api.clone()));
    api.unwrap_or_else(|| violation(Violation::Protocol, "no handle scope is open on this thread"))
}

enum Lookup {
    Found(Element),
    Missing { api: SharedApi, scope: u64 },
}

fn lookup(handle: Handle) -> Option<Lookup> {
    STACK.with(|stack| {
        let stack = stack.borrow();
        let top = stack.frames.last()?;
        let found = stack.frames.iter().rev().find_map(|frame| frame.find(handle));
        Some(match found {
            Some(element) => Lookup::Found(element.clone()),
            None => Lookup::Missing {
                api: top.api.clone(),
                scope: top.id,
            },
        })
    })
}

/// Find or create the wrapper for `handle` on this thread's stack
#[track_caller]
pub(crate) fn get_or_create(handle: Handle) -> Result<Element> {
    if handle.is_null() {
        violation(Violation::Protocol, "null element handle");
    }

    let (api, scope) = match lookup(handle) {
        None => violation(
            Violation::Protocol,
            format_args!("element {} looked up with no handle scope open", handle),
        ),
        Some(Lookup::Found(element)) => return Ok(element),
        Some(Lookup::Missing { api, scope }) => (api, scope),
    };

    // The engine may call back into this thread, so no borrow is held here
    api.use_element(handle).into_result("use_element", handle)?;
    trace!(%handle, scope, "element reference taken");

    let outcome = STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(element) = stack.frames.iter().rev().find_map(|f| f.find(handle)) {
            return Ok(Err(element.clone()));
        }
        let Some(top) = stack.frames.last_mut() else {
            return Err(0);
        };
        if top.id != scope {
            return Err(top.id);
        }

        let element = Element::new(handle);
        top.insert(handle, element.clone());

        let limit = large_scope_warning();
        if limit > 0 && !top.warned && top.owned_count() > limit {
            top.warned = true;
            warn!(scope, owned = top.owned_count(), limit, "handle scope is unusually large");
        }
        Ok(Ok(element))
    });

    match outcome {
        Ok(Ok(element)) => Ok(element),
        Ok(Err(existing)) => {
            // A callback protected the handle meanwhile; drop the extra reference
            api.unuse_element(handle).into_result("unuse_element", handle)?;
            Ok(existing)
        }
        Err(current) => violation(
            Violation::Protocol,
            format_args!(
                "scope {} was replaced by scope {} while protecting {}",
                scope, current, handle
            ),
        ),
    }
}

// ============================================================================
// Scope guard
// ============================================================================

/// Guard for one open scope
///
/// Dropping the guard closes the scope; [`close`](HandleScope::close) does
/// the same and reports release failures. The guard is tied to the thread
/// that opened it.
#[must_use = "the scope closes as soon as the guard is dropped"]
pub struct HandleScope {
    id: u64,
    closed: bool,
    _thread: PhantomData<*const ()>,
}

impl HandleScope {
    /// Open a scope using the enclosing scope's API, or the default API when
    /// this is the outermost scope
    #[track_caller]
    pub fn open() -> Self {
        let inherited = STACK.with(|stack| stack.borrow().frames.last().map(|f| f.api.clone()));
        let Some(api) = inherited.or_else(default_api) else {
            violation(Violation::Protocol, "no element API installed for a new scope")
        };
        Self::push(api)
    }

    /// Open a scope bound to `api`
    pub fn open_with(api: SharedApi) -> Self {
        Self::push(api)
    }

    fn push(api: SharedApi) -> Self {
        let (id, depth) = STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let id = stack.next_id;
            stack.next_id += 1;
            stack.frames.push(ScopeFrame::new(id, api));
            (id, stack.frames.len())
        });
        debug!(scope = id, depth, "handle scope opened");
        HandleScope {
            id,
            closed: false,
            _thread: PhantomData,
        }
    }

    /// Run `f` inside a new scope and close it afterwards
    pub fn scoped<R>(f: impl FnOnce() -> Result<R>) -> Result<R> {
        let scope = Self::open();
        let result = f();
        let closed = scope.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    /// [`scoped`](HandleScope::scoped) with an explicit API
    pub fn scoped_with<R>(
        api: SharedApi,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let scope = Self::open_with(api);
        let result = f();
        let closed = scope.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Close the scope, releasing every handle it owns.
    ///
    /// All owned handles are released even when some releases fail; the
    /// first failure is returned.
    #[track_caller]
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.pop_and_release()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether this is the innermost scope
    pub fn is_current(&self) -> bool {
        STACK.with(|stack| stack.borrow().frames.last().is_some_and(|f| f.id == self.id))
    }

    /// Handles this scope took references for
    pub fn owned_count(&self) -> usize {
        STACK.with(|stack| {
            stack
                .borrow()
                .frames
                .iter()
                .find(|f| f.id == self.id)
                .map_or(0, ScopeFrame::owned_count)
        })
    }

    /// Whether this scope spilled past its inline slots
    pub fn spilled(&self) -> bool {
        STACK.with(|stack| {
            stack
                .borrow()
                .frames
                .iter()
                .find(|f| f.id == self.id)
                .is_some_and(ScopeFrame::spilled)
        })
    }

    /// Number of open scopes on this thread
    pub fn depth() -> usize {
        STACK.with(|stack| stack.borrow().frames.len())
    }

    /// Whether any scope is open on this thread
    pub fn is_active() -> bool {
        Self::depth() > 0
    }

    #[track_caller]
    fn pop_and_release(&mut self) -> Result<()> {
        let popped = STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.frames.last() {
                Some(top) if top.id == self.id => Ok(stack.frames.pop()),
                Some(top) => Err(Some(top.id)),
                None => Err(None),
            }
        });

        let mut frame = match popped {
            Ok(Some(frame)) => frame,
            Ok(None) => unreachable!("top frame vanished during pop"),
            Err(current) => {
                let message = match current {
                    Some(current) => format!(
                        "scope {} closed while scope {} is innermost",
                        self.id, current
                    ),
                    None => format!("scope {} closed with no scope open", self.id),
                };
                if thread::panicking() {
                    error!("{} (during unwind, handles leaked)", message);
                    return Ok(());
                }
                violation(Violation::Protocol, message);
            }
        };

        let owned = frame.drain();
        debug!(scope = self.id, released = owned.len(), "handle scope closed");

        let mut first_error: Option<BridgeError> = None;
        for element in owned {
            let handle = element.raw_handle();
            element.mark_dropped();
            let released = frame.api.unuse_element(handle).into_result("unuse_element", handle);
            trace!(%handle, scope = self.id, "element reference released");
            if let Err(err) = released {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for HandleScope {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.pop_and_release() {
            warn!(scope = self.id, error = %err, "release failed while closing handle scope");
        }
    }
}

impl std::fmt::Debug for HandleScope {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("HandleScope")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests;
