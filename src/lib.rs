//! uibridge
//!
//! Plumbing between a Rust application and a native UI engine that exposes
//! its DOM through a flat C function table and opaque handles.
//!
//! - [`Value`] marshals dynamically typed data in the engine's record layout,
//!   with reference-counted blocks that each side frees with its own
//!   allocator.
//! - [`HandleScope`] and [`Element`] keep engine handles referenced for
//!   exactly as long as a lexical region needs them.
//! - [`InstanceRegistry`] turns Rust objects into cookies native callbacks
//!   can carry, without keeping the objects alive.
//!
//! # Example
//!
//! ```no_run
//! use uibridge::{Element, Handle, HandleScope, NativeValue, RecordingApi, Value};
//!
//! fn main() -> uibridge::Result<()> {
//!     let api = RecordingApi::shared();
//!     HandleScope::scoped_with(api, || {
//!         let body = Element::wrap(Handle::from_raw(0xAAAA))?;
//!         let title = Value::from_native(&NativeValue::from("hello"));
//!         println!("{:?} {}", body, title);
//!         Ok(())
//!     })
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod runtime;
pub mod util;

pub use runtime::error::{BridgeError, Result};
pub use runtime::registry::{Cookie, InstanceRegistry};
pub use runtime::scope::{
    install_default_api, DomFunctionTable, DomResult, Element, ElementApi, ElementRef, Handle,
    HandleScope, RecordingApi, SharedApi,
};
pub use runtime::value::{MapKey, NativeMap, NativeValue, RawValue, Value, ValueType};
pub use util::config::BridgeConfig;

use tracing::debug;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "uibridge";

/// Apply process-wide settings from `config`.
///
/// Sets the large scope threshold for every thread and the sweep interval
/// of the global registry. Logging is left alone; see [`util::logger`].
pub fn init(config: &BridgeConfig) {
    runtime::scope::set_large_scope_warning(config.scope.large_scope_warning);
    runtime::registry::global().set_sweep_interval(config.registry.sweep_interval);
    debug!(
        large_scope_warning = config.scope.large_scope_warning,
        sweep_interval = config.registry.sweep_interval,
        "bridge configured"
    );
}
