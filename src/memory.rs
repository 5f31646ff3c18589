//! Global allocator selection and allocation accounting
//!
//! With the `memory_tracking` feature the global allocator (mimalloc, or the
//! system allocator without the `mimalloc` feature) is wrapped in
//! [`Counting`], which keeps a running byte total and its high-water mark.
//! Without it the accessors report zeros.

use std::alloc::{GlobalAlloc, Layout};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bytes held through the global allocator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub current: usize,
    pub peak: usize,
}

/// Allocator wrapper counting live bytes and their high-water mark
pub struct Counting<A> {
    inner: A,
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl<A> Counting<A> {
    pub const fn new(inner: A) -> Self {
        Counting {
            inner,
            live: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn usage(&self) -> MemoryUsage {
        MemoryUsage {
            current: self.live.load(Ordering::SeqCst),
            peak: self.peak.load(Ordering::SeqCst),
        }
    }

    /// Restart the high-water mark from the current total. Returns the
    /// usage as it was before the reset.
    pub fn reset_peak(&self) -> MemoryUsage {
        let current = self.live.load(Ordering::SeqCst);
        let peak = self.peak.swap(current, Ordering::SeqCst);
        MemoryUsage { current, peak }
    }

    #[inline]
    fn grew(&self, bytes: usize) {
        let now = self.live.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.peak.fetch_max(now, Ordering::Relaxed);
    }

    #[inline]
    fn shrank(&self, bytes: usize) {
        self.live.fetch_sub(bytes, Ordering::Relaxed);
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for Counting<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            self.grew(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            self.grew(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout);
        self.shrank(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let moved = self.inner.realloc(ptr, layout, new_size);
        if !moved.is_null() {
            let old_size = layout.size();
            if new_size >= old_size {
                self.grew(new_size - old_size);
            } else {
                self.shrank(old_size - new_size);
            }
        }
        moved
    }
}

#[cfg(all(feature = "memory_tracking", feature = "mimalloc"))]
#[global_allocator]
static GLOBAL: Counting<mimalloc::MiMalloc> = Counting::new(mimalloc::MiMalloc);

#[cfg(all(feature = "memory_tracking", not(feature = "mimalloc")))]
#[global_allocator]
static GLOBAL: Counting<std::alloc::System> = Counting::new(std::alloc::System);

#[cfg(all(feature = "mimalloc", not(feature = "memory_tracking")))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Current and peak bytes held by the process-wide allocator
pub fn usage() -> MemoryUsage {
    #[cfg(feature = "memory_tracking")]
    {
        GLOBAL.usage()
    }
    #[cfg(not(feature = "memory_tracking"))]
    {
        MemoryUsage::default()
    }
}

/// Reset the process-wide high-water mark, returning the usage before it
pub fn reset_peak() -> MemoryUsage {
    #[cfg(feature = "memory_tracking")]
    {
        GLOBAL.reset_peak()
    }
    #[cfg(not(feature = "memory_tracking"))]
    {
        MemoryUsage::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::alloc::System;

    #[test]
    fn test_counts_live_bytes_and_peak() {
        let counting = Counting::new(System);
        let layout = Layout::from_size_align(64, 8).unwrap();
        unsafe {
            let ptr = counting.alloc(layout);
            assert!(!ptr.is_null());
            let ptr = counting.realloc(ptr, layout, 16);
            assert!(!ptr.is_null());
            assert_eq!(counting.usage(), MemoryUsage { current: 16, peak: 64 });
            counting.dealloc(ptr, Layout::from_size_align(16, 8).unwrap());
        }
        assert_eq!(counting.usage().current, 0);
        assert_eq!(counting.reset_peak(), MemoryUsage { current: 0, peak: 64 });
        assert_eq!(counting.usage().peak, 0);
    }
}
