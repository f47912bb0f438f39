//! Error taxonomy for the bridge
//!
//! Only foreign-call failures and caller errors against the registry are
//! values. Lifetime and marshaling defects are fatal: they are logged and
//! turned into a panic at the point of detection.

use std::fmt;

use thiserror::Error;

use crate::runtime::registry::Cookie;
use crate::runtime::scope::{DomResult, Handle};

/// Recoverable bridge errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// A foreign primitive reported a non-success status
    #[error("foreign call {op} failed for handle {handle} with status {status}")]
    ForeignCall {
        /// Primitive name (`use_element`, `unuse_element`)
        op: &'static str,
        /// Handle the call was made for
        handle: Handle,
        /// Status reported by the engine
        status: DomResult,
    },

    /// The cookie was never issued by the registry it was resolved against
    #[error("unknown cookie {0}")]
    UnknownCookie(Cookie),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Kinds of fatal defects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Scope closed out of order, handle used without a scope, wrapper used
    /// after its scope closed
    Protocol,
    /// A value was read as a kind its tag does not carry
    MarshalMismatch,
}

impl fmt::Display for Violation {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Violation::Protocol => write!(f, "protocol violation"),
            Violation::MarshalMismatch => write!(f, "marshal mismatch"),
        }
    }
}

/// Log and abort the current operation.
///
/// Continuing after one of these risks touching released foreign memory.
#[cold]
#[track_caller]
pub fn violation(
    kind: Violation,
    message: impl fmt::Display,
) -> ! {
    tracing::error!("{}: {}", kind, message);
    panic!("{}: {}", kind, message)
}
