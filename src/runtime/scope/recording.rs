//! In-process engine double
//!
//! Records every successful add-ref and release, keeps per-handle live
//! reference counts, and can be told to fail specific calls.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;

use super::foreign::{DomResult, ElementApi, Handle};

/// Primitive kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOp {
    Use,
    Unuse,
}

/// One successful primitive call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiEvent {
    pub op: ApiOp,
    pub handle: Handle,
}

impl fmt::Display for ApiEvent {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.op {
            ApiOp::Use => write!(f, "use_element({})", self.handle),
            ApiOp::Unuse => write!(f, "unuse_element({})", self.handle),
        }
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    events: Vec<ApiEvent>,
    live: HashMap<Handle, i64>,
    failures: HashMap<(ApiOp, Handle), DomResult>,
}

/// Engine double implementing [`ElementApi`]
#[derive(Debug, Default)]
pub struct RecordingApi {
    state: Mutex<RecordingState>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every `op` on `handle` fail with `status` until healed
    pub fn fail(
        &self,
        op: ApiOp,
        handle: Handle,
        status: DomResult,
    ) {
        self.state.lock().failures.insert((op, handle), status);
    }

    pub fn heal(
        &self,
        op: ApiOp,
        handle: Handle,
    ) {
        self.state.lock().failures.remove(&(op, handle));
    }

    /// Successful calls in order
    pub fn events(&self) -> Vec<ApiEvent> {
        self.state.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    pub fn count(
        &self,
        op: ApiOp,
        handle: Handle,
    ) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| e.op == op && e.handle == handle)
            .count()
    }

    pub fn use_count(
        &self,
        handle: Handle,
    ) -> usize {
        self.count(ApiOp::Use, handle)
    }

    pub fn unuse_count(
        &self,
        handle: Handle,
    ) -> usize {
        self.count(ApiOp::Unuse, handle)
    }

    /// References currently held on `handle`
    pub fn live_refs(
        &self,
        handle: Handle,
    ) -> i64 {
        self.state.lock().live.get(&handle).copied().unwrap_or(0)
    }

    /// Sum of references held on every handle
    pub fn total_live(&self) -> i64 {
        self.state.lock().live.values().sum()
    }

    fn call(
        &self,
        op: ApiOp,
        handle: Handle,
    ) -> DomResult {
        let mut state = self.state.lock();
        if let Some(&status) = state.failures.get(&(op, handle)) {
            return status;
        }
        let delta = match op {
            ApiOp::Use => 1,
            ApiOp::Unuse => -1,
        };
        let live = state.live.entry(handle).or_insert(0);
        *live += delta;
        if *live == 0 {
            state.live.remove(&handle);
        }
        state.events.push(ApiEvent { op, handle });
        DomResult::Ok
    }
}

impl ElementApi for RecordingApi {
    fn use_element(
        &self,
        handle: Handle,
    ) -> DomResult {
        self.call(ApiOp::Use, handle)
    }

    fn unuse_element(
        &self,
        handle: Handle,
    ) -> DomResult {
        self.call(ApiOp::Unuse, handle)
    }
}
