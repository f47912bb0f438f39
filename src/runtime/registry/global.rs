//! Process-wide registry used by engine callbacks

use std::any::{type_name, Any};
use std::sync::Arc;

use once_cell::sync::Lazy;

use super::{Cookie, InstanceRegistry};
use crate::runtime::error::{violation, BridgeError, Result, Violation};

static GLOBAL: Lazy<InstanceRegistry> = Lazy::new(InstanceRegistry::new);

/// The registry shared by every callback entry point
pub fn global() -> &'static InstanceRegistry {
    &GLOBAL
}

/// Register `instance` in the global registry
pub fn protect<T: Any + Send + Sync>(instance: &Arc<T>) -> Cookie {
    GLOBAL.protect(instance)
}

/// Resolve a cookie against the global registry
#[track_caller]
pub fn resolve<T: Any + Send + Sync>(cookie: Cookie) -> Result<Option<Arc<T>>> {
    GLOBAL.resolve(cookie)
}

/// Run `f` on the instance an engine callback refers to.
///
/// The engine only calls back with cookies it was given, for objects that
/// should still exist; a cookie that is unknown or whose instance was
/// collected means native code called into destroyed state, which is fatal.
#[track_caller]
pub fn dispatch<T, R>(
    cookie: Cookie,
    f: impl FnOnce(&T) -> R,
) -> R
where
    T: Any + Send + Sync,
{
    match GLOBAL.resolve::<T>(cookie) {
        Ok(Some(instance)) => f(&instance),
        Ok(None) => violation(
            Violation::Protocol,
            format_args!("callback into collected {} ({})", type_name::<T>(), cookie),
        ),
        Err(BridgeError::UnknownCookie(cookie)) => violation(
            Violation::Protocol,
            format_args!("callback with unknown cookie {}", cookie),
        ),
        Err(err) => violation(Violation::Protocol, err),
    }
}
