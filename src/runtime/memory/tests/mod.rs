//! Block allocation tests

use crate::runtime::memory::{allocate, live_blocks, release_with, wipe, BLOCK_ALIGN};

#[cfg(test)]
mod block_tests {
    use super::*;

    #[test]
    fn test_allocate_is_zeroed_and_aligned() {
        let before = live_blocks();
        let block = allocate(40);
        assert_eq!(block.as_ptr() as usize % BLOCK_ALIGN, 0);

        // Safety: 40 bytes were just allocated
        unsafe {
            let bytes = std::slice::from_raw_parts(block.as_ptr(), 40);
            assert!(bytes.iter().all(|&b| b == 0));
        }
        assert_eq!(live_blocks(), before + 1);

        // Safety: block came from allocate and is wiped once
        unsafe { wipe(block.as_ptr().cast()) };
        assert_eq!(live_blocks(), before);
    }

    #[test]
    fn test_allocate_zero_payload() {
        let before = live_blocks();
        let block = allocate(0);
        // Safety: block came from allocate and is wiped once
        unsafe { wipe(block.as_ptr().cast()) };
        assert_eq!(live_blocks(), before);
    }

    #[test]
    fn test_wipe_null_is_noop() {
        let before = live_blocks();
        // Safety: null is explicitly accepted
        unsafe { wipe(std::ptr::null_mut()) };
        assert_eq!(live_blocks(), before);
    }

    #[test]
    fn test_release_with_uses_given_function() {
        let before = live_blocks();
        let block = allocate(8);
        // Safety: wipe is the release function for allocate's blocks
        unsafe { release_with(wipe, block.as_ptr().cast()) };
        assert_eq!(live_blocks(), before);
    }

    #[test]
    fn test_block_write_read() {
        let block = allocate(std::mem::size_of::<f64>());
        // Safety: the block holds 8 aligned bytes
        unsafe {
            block.as_ptr().cast::<f64>().write(3.14159);
            assert!((block.as_ptr().cast::<f64>().read() - 3.14159).abs() < 1e-9);
            wipe(block.as_ptr().cast());
        }
    }
}
