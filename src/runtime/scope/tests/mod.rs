//! Tests for the handle scope stack


use std::sync::Arc;

use crate::runtime::scope::{Handle, RecordingApi, SharedApi};

pub(super) const H: Handle = Handle::from_raw(0xAAAA);

pub(super) fn handle(n: usize) -> Handle {
    Handle::from_raw(0x1000 + n)
}

pub(super) fn recording() -> (Arc<RecordingApi>, SharedApi) {
    let api = RecordingApi::shared();
    let shared: SharedApi = api.clone();
    (api, shared)
}
