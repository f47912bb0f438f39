//! Cross-allocator block memory
//!
//! Blocks shared with the engine are released through a function pointer
//! stored in the block itself. Blocks created here carry [`wipe`]; blocks
//! created by the engine carry the engine's own release function, so each
//! side always frees memory with the allocator that produced it.
//!
//! Allocation failure aborts through `handle_alloc_error`, the same policy
//! the standard collections follow.

mod allocator;

pub use allocator::{MemoryLayout, BLOCK_ALIGN, BLOCK_PREFIX};

use std::alloc;
use std::cell::Cell;
use std::ffi::c_void;
use std::ptr::NonNull;

use tracing::trace;

/// C-ABI release function stored in every block header
pub type ReleaseFn = unsafe extern "C" fn(block: *mut c_void);

thread_local! {
    /// Blocks allocated minus blocks wiped on this thread
    static LIVE_BLOCKS: Cell<isize> = const { Cell::new(0) };
}

/// Allocate a zeroed block with room for `payload` bytes.
///
/// The returned pointer is 8-byte aligned and must eventually be passed to
/// [`wipe`] exactly once.
pub fn allocate(payload: usize) -> NonNull<u8> {
    let layout = MemoryLayout::for_block(payload)
        .unwrap_or_else(|| panic!("block of {} bytes exceeds the address space", payload));
    let std_layout = layout.to_std_layout();

    // Safety: the layout has a non-zero size (it always includes the prefix)
    let base = unsafe { alloc::alloc_zeroed(std_layout) };
    let Some(base) = NonNull::new(base) else {
        alloc::handle_alloc_error(std_layout)
    };

    // Safety: the prefix is inside the allocation and suitably aligned
    unsafe {
        base.as_ptr().cast::<usize>().write(layout.size());
    }
    LIVE_BLOCKS.with(|live| live.set(live.get() + 1));
    trace!(payload, "block allocated");

    // Safety: BLOCK_PREFIX < layout.size(), the result stays in bounds
    unsafe { NonNull::new_unchecked(base.as_ptr().add(BLOCK_PREFIX)) }
}

/// Release function for blocks produced by [`allocate`].
///
/// # Safety
/// `block` must be null or a pointer returned by [`allocate`] that has not
/// been wiped yet.
pub unsafe extern "C" fn wipe(block: *mut c_void) {
    if block.is_null() {
        return;
    }

    let base = block.cast::<u8>().sub(BLOCK_PREFIX);
    let size = base.cast::<usize>().read();
    alloc::dealloc(base, alloc::Layout::from_size_align_unchecked(size, BLOCK_ALIGN));
    LIVE_BLOCKS.with(|live| live.set(live.get() - 1));
    trace!(size, "block wiped");
}

/// Free `block` with the release function it was created with.
///
/// # Safety
/// `release` must be the function stored in the block header and the block
/// must not be referenced afterwards.
pub unsafe fn release_with(
    release: ReleaseFn,
    block: *mut c_void,
) {
    release(block);
}

/// Number of blocks allocated by this thread that are still alive
pub fn live_blocks() -> isize {
    LIVE_BLOCKS.with(Cell::get)
}

#[cfg(test)]
mod tests;
