//! Runtime side of the engine bridge
//!
//! This module contains value marshaling, handle protection and the instance
//! registry used by engine callbacks.

pub mod error;
pub mod memory;
pub mod registry;
pub mod scope;
pub mod value;
