//! Foreign instance registry
//!
//! Native callbacks carry an integer cookie instead of a pointer. The
//! registry maps cookies back to Rust instances through weak references, so
//! registering an instance never keeps it alive on its own.
//!
//! Cookies are generational slot indices. A slot whose instance died is
//! purged on the next protect or resolve that notices it, or by an explicit
//! [`sweep`](InstanceRegistry::sweep); purging bumps the slot generation so
//! the old cookie reads as collected rather than naming the next occupant.

mod global;

pub use global::{dispatch, global, protect, resolve};

use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::runtime::error::{violation, BridgeError, Result, Violation};

/// Type-erased registered instance
pub type Instance = Arc<dyn Any + Send + Sync>;

type WeakInstance = Weak<dyn Any + Send + Sync>;

/// Token handed to native code in place of an instance pointer
///
/// Low 32 bits are the slot index, high 32 bits the slot generation. A
/// cookie is never zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cookie(u64);

impl Cookie {
    fn new(
        index: u32,
        generation: u32,
    ) -> Self {
        Cookie((u64::from(generation) << 32) | u64::from(index))
    }

    /// Rebuild a cookie received from native code; zero is never a cookie
    pub fn from_raw(raw: u64) -> Option<Self> {
        (raw >> 32 != 0).then_some(Cookie(raw))
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }

    pub fn index(self) -> u32 {
        self.0 as u32
    }

    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for Cookie {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

impl fmt::Debug for Cookie {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Cookie({})", self)
    }
}

struct Slot {
    generation: u32,
    entry: Option<WeakInstance>,
}

#[derive(Default)]
struct Slots {
    slots: Vec<Slot>,
    free: Vec<u32>,
    protects_since_sweep: usize,
}

impl Slots {
    /// Clear every entry whose instance is gone
    fn purge(&mut self) -> usize {
        let mut purged = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let stale = slot.entry.as_ref().is_some_and(|w| w.strong_count() == 0);
            if stale {
                slot.entry = None;
                slot.generation = next_generation(slot.generation);
                self.free.push(index as u32);
                purged += 1;
            }
        }
        if purged > 0 {
            debug!(purged, "stale registry entries purged");
        }
        purged
    }

    fn insert(
        &mut self,
        weak: WeakInstance,
    ) -> Cookie {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(weak);
            return Cookie::new(index, slot.generation);
        }
        let index = u32::try_from(self.slots.len())
            .unwrap_or_else(|_| panic!("instance registry exceeds {} slots", u32::MAX));
        self.slots.push(Slot {
            generation: 1,
            entry: Some(weak),
        });
        Cookie::new(index, 1)
    }
}

fn next_generation(generation: u32) -> u32 {
    match generation.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

/// Cookie-keyed registry of weakly held instances
///
/// All operations take one lock; the registry may be shared freely between
/// threads.
pub struct InstanceRegistry {
    inner: Mutex<Slots>,
    sweep_interval: AtomicUsize,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Slots::default()),
            sweep_interval: AtomicUsize::new(0),
        }
    }

    /// Registry that also sweeps every `interval` protect calls
    pub fn with_sweep_interval(interval: usize) -> Self {
        let registry = Self::new();
        registry.set_sweep_interval(interval);
        registry
    }

    /// 0 keeps the purely opportunistic purge
    pub fn set_sweep_interval(
        &self,
        interval: usize,
    ) {
        self.sweep_interval.store(interval, Ordering::Relaxed);
    }

    pub fn sweep_interval(&self) -> usize {
        self.sweep_interval.load(Ordering::Relaxed)
    }

    /// Register `instance` and return its cookie.
    ///
    /// Registering the same instance again returns the same cookie. If the
    /// scan passes a dead entry, all dead entries are purged.
    pub fn protect<T: Any + Send + Sync>(
        &self,
        instance: &Arc<T>,
    ) -> Cookie {
        let target = Arc::as_ptr(instance).cast::<()>();
        let mut inner = self.inner.lock();

        let mut saw_stale = false;
        let mut existing = None;
        for (index, slot) in inner.slots.iter().enumerate() {
            let Some(weak) = &slot.entry else { continue };
            if weak.strong_count() == 0 {
                saw_stale = true;
            } else if weak.as_ptr().cast::<()>() == target {
                existing = Some(Cookie::new(index as u32, slot.generation));
                break;
            }
        }
        if saw_stale {
            inner.purge();
        }

        let cookie = existing.unwrap_or_else(|| {
            let weak: Weak<T> = Arc::downgrade(instance);
            let weak: WeakInstance = weak;
            let cookie = inner.insert(weak);
            trace!(%cookie, ty = type_name::<T>(), "instance protected");
            cookie
        });

        let interval = self.sweep_interval();
        inner.protects_since_sweep += 1;
        if interval > 0 && inner.protects_since_sweep >= interval {
            inner.protects_since_sweep = 0;
            inner.purge();
        }
        cookie
    }

    /// Look up the instance behind `cookie` without checking its type.
    ///
    /// `Ok(None)` means the instance was collected. A cookie this registry
    /// never issued is an error.
    pub fn resolve_any(
        &self,
        cookie: Cookie,
    ) -> Result<Option<Instance>> {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.slots.get(cookie.index() as usize) else {
            return Err(BridgeError::UnknownCookie(cookie));
        };
        if cookie.generation() == 0 || cookie.generation() > slot.generation {
            return Err(BridgeError::UnknownCookie(cookie));
        }
        if cookie.generation() < slot.generation {
            return Ok(None);
        }

        let upgraded = slot.entry.as_ref().and_then(Weak::upgrade);
        match upgraded {
            Some(instance) => Ok(Some(instance)),
            None => {
                inner.purge();
                Ok(None)
            }
        }
    }

    /// Look up the instance behind `cookie` as a `T`.
    ///
    /// A cookie naming an instance of another type is a protocol violation.
    #[track_caller]
    pub fn resolve<T: Any + Send + Sync>(
        &self,
        cookie: Cookie,
    ) -> Result<Option<Arc<T>>> {
        let Some(instance) = self.resolve_any(cookie)? else {
            return Ok(None);
        };
        match instance.downcast::<T>() {
            Ok(typed) => Ok(Some(typed)),
            Err(_) => violation(
                Violation::Protocol,
                format_args!("cookie {} does not name a {}", cookie, type_name::<T>()),
            ),
        }
    }

    /// Purge every dead entry now; returns how many were removed
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.protects_since_sweep = 0;
        inner.purge()
    }

    /// Occupied entries, dead or alive
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .slots
            .iter()
            .filter(|s| s.entry.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries whose instance is still alive
    pub fn live(&self) -> usize {
        self.inner
            .lock()
            .slots
            .iter()
            .filter_map(|s| s.entry.as_ref())
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InstanceRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("len", &self.len())
            .field("sweep_interval", &self.sweep_interval())
            .finish()
    }
}

#[cfg(test)]
mod tests;
