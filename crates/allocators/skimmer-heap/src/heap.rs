use log::debug;
use skimmer_core::allocator::{AllocError, DmaAllocator, FreeError};
use skimmer_core::memory::{Backing, DmaRegion, base_page_size};

/// Standard heap allocator with optional pinning.
///
/// Used for state the device never reads over DMA, or as a degraded
/// fallback when the hugetlbfs mount is absent.
#[derive(Debug, Default, Copy, Clone)]
pub struct HeapAllocator {}

impl HeapAllocator {
    /// Creates a heap allocator.
    pub fn new() -> Self {
        HeapAllocator {}
    }

    /// Allocates `size` bytes, rounded up to the base page size.
    ///
    /// With `pin`, the pages are locked against swap after allocation. A
    /// refused lock does not release the memory: the region rides inside
    /// [`AllocError::PinFailed`] and the caller picks between degraded use
    /// and freeing it.
    ///
    /// # Errors
    ///
    /// [`AllocError::AllocationFailed`] when the heap allocation itself
    /// fails, [`AllocError::PinFailed`] when memory was obtained but could
    /// not be locked.
    pub fn allocate(&self, size: usize, pin: bool) -> Result<DmaRegion, AllocError> {
        let len = size.next_multiple_of(base_page_size() as usize);
        let addr = unsafe { libc::malloc(len) };
        if addr.is_null() {
            return Err(AllocError::AllocationFailed {
                stage: "heap allocation",
                source: std::io::Error::last_os_error(),
            });
        }
        let addr = addr as usize;
        if pin && unsafe { libc::mlock(addr as *const libc::c_void, len) } != 0 {
            return Err(AllocError::PinFailed {
                region: DmaRegion::from_raw_parts(addr, len, Backing::Heap, false, false),
                source: std::io::Error::last_os_error(),
            });
        }
        debug!("allocated {} heap bytes at 0x{:x} (pinned: {})", len, addr, pin);
        Ok(DmaRegion::from_raw_parts(addr, len, Backing::Heap, pin, false))
    }

    /// Releases a heap region.
    pub fn free(&self, region: DmaRegion) {
        assert_eq!(
            region.backing(),
            Backing::Heap,
            "region was not produced by the heap allocator"
        );
        unsafe { libc::free(region.addr() as *mut libc::c_void) };
    }
}

impl DmaAllocator for HeapAllocator {
    type Error = AllocError;

    fn granularity(&self) -> usize {
        base_page_size() as usize
    }

    fn allocate(&mut self, size: usize) -> Result<DmaRegion, AllocError> {
        // DMA-visible memory must not be swapped out under the device
        HeapAllocator::allocate(self, size, true)
    }

    fn free(&mut self, region: DmaRegion) -> Result<(), FreeError> {
        HeapAllocator::free(self, region);
        Ok(())
    }
}
