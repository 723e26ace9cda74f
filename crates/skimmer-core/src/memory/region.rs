use super::virt_to_phys::PhysAddr;

/// Backing storage a [`DmaRegion`] was obtained from.
///
/// Regions must return to the strategy that produced them; the tag exists
/// so heap and huge-page frees can never be cross-applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backing {
    /// Heap memory from the standard allocator.
    Heap,
    /// A mapping backed by huge pages out of a hugetlbfs file.
    HugePage,
    /// A shared mapping over a caller-owned file or device handle.
    FileMapped,
}

/// An allocated memory region suitable for device DMA.
///
/// The region is owned exclusively by the caller; the allocator that
/// produced it keeps no reference, so lifetime and validity are entirely
/// the caller's responsibility until the region is handed back for
/// release. The base address is deliberately opaque: dereferencing goes
/// through [`crate::memory::access`], the one module where raw access
/// assumptions live.
#[derive(Clone, Debug)]
pub struct DmaRegion {
    addr: usize,
    len: usize,
    backing: Backing,
    pinned: bool,
    contiguous: bool,
}

impl DmaRegion {
    /// Assembles a region from its raw parts.
    ///
    /// Normally only backing strategies construct regions. `len` must be
    /// the rounded backing length, not the requested size.
    pub fn from_raw_parts(
        addr: usize,
        len: usize,
        backing: Backing,
        pinned: bool,
        contiguous: bool,
    ) -> Self {
        DmaRegion {
            addr,
            len,
            backing,
            pinned,
            contiguous,
        }
    }

    /// Base virtual address of the region.
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// Backing length in bytes, a multiple of the backing page size.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the region is zero-sized.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Storage this region came from.
    pub fn backing(&self) -> Backing {
        self.backing
    }

    /// Whether the region is locked against swap.
    pub fn pinned(&self) -> bool {
        self.pinned
    }

    /// Whether the region is guaranteed physically contiguous.
    pub fn is_contiguous(&self) -> bool {
        self.contiguous
    }

    /// Virtual address `offset` bytes into the region.
    pub fn addr_at(&self, offset: usize) -> usize {
        assert!(
            offset < self.len,
            "offset {} out of bounds for region of {} bytes",
            offset,
            self.len
        );
        self.addr + offset
    }
}

/// A region together with the physical address of its base.
///
/// This is the pair descriptor-programming code works with: buffers are
/// filled through the virtual side while the physical side goes into the
/// hardware descriptor.
#[derive(Clone, Debug)]
pub struct DmaMemory {
    /// The virtual-side region.
    pub region: DmaRegion,
    /// Physical address of the region base.
    pub phys: PhysAddr,
}
