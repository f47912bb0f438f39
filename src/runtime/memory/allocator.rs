//! Block layout arithmetic
//!
//! Every block handed across the boundary is allocated with a hidden size
//! prefix so that `wipe` can free it given nothing but the block address,
//! which is all the engine passes back to a release function.

use core::alloc::Layout;

/// Bytes reserved in front of each block for the allocation size
pub const BLOCK_PREFIX: usize = 16;

/// Alignment of every block (enough for `f64` and pointers)
pub const BLOCK_ALIGN: usize = 8;

/// Memory layout helper
///
/// Wraps `std::alloc::Layout` with convenient constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    size: usize,
    align: usize,
}

impl MemoryLayout {
    /// Create a layout from size and alignment
    ///
    /// # Returns
    /// `Some(MemoryLayout)` if alignment is a power of two and the rounded
    /// size does not overflow, `None` otherwise.
    pub fn from_size_align(
        size: usize,
        align: usize,
    ) -> Option<Self> {
        if align == 0 || !align.is_power_of_two() {
            return None;
        }

        let aligned_size = size.checked_add(align - 1)? & !(align - 1);
        if aligned_size > isize::MAX as usize {
            return None;
        }

        Some(Self {
            size: aligned_size,
            align,
        })
    }

    /// Create a layout for type T
    pub fn new<T>() -> Self {
        Self {
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
        }
    }

    /// Layout of a block carrying `payload` bytes, prefix included
    pub fn for_block(payload: usize) -> Option<Self> {
        Self::from_size_align(payload.checked_add(BLOCK_PREFIX)?, BLOCK_ALIGN)
    }

    /// Get the size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the alignment
    pub fn align(&self) -> usize {
        self.align
    }

    /// Convert to std::alloc::Layout
    pub fn to_std_layout(&self) -> Layout {
        // Safety: size and align are validated by the constructors
        unsafe { Layout::from_size_align_unchecked(self.size, self.align) }
    }
}
