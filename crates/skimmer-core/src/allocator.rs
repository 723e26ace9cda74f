//! Backing strategies for DMA-safe memory.
//!
//! This module defines the [`DmaAllocator`] trait, the allocation error
//! taxonomy, and the main [`allocate_dma`] function that obtains a region
//! and resolves the physical address hardware descriptors are programmed
//! with.

use log::debug;
use thiserror::Error;

use crate::memory::{
    DmaMemory, DmaRegion, PagemapResolver, TranslationError, VirtToPhysResolver,
};

/// Errors surfaced by the backing strategies.
///
/// Every failure is a typed error; no operation hands back a zero or null
/// address as a failure signal.
#[derive(Debug, Error)]
pub enum AllocError {
    /// Huge pages are not supported on this system.
    #[error("huge pages are unsupported on this system")]
    Unsupported,
    /// The request cannot be satisfied with a physical-contiguity guarantee.
    ///
    /// A single huge page is the largest region guaranteed contiguous
    /// without IOMMU coalescing; accept non-contiguous memory or reduce
    /// the size.
    #[error("cannot guarantee {requested} physically contiguous bytes with {huge_page_size} byte huge pages")]
    ContiguityUnavailable {
        /// Rounded request length in bytes.
        requested: usize,
        /// Huge page size in bytes.
        huge_page_size: usize,
    },
    /// An OS call in the allocation path failed.
    #[error("allocation failed while {stage}")]
    AllocationFailed {
        /// The allocation step that failed.
        stage: &'static str,
        /// The OS error.
        #[source]
        source: std::io::Error,
    },
    /// Memory was allocated but could not be pinned against swap.
    ///
    /// The region inside is live and usable, merely swappable. The caller
    /// decides whether to keep it in degraded form or free it.
    #[error("allocated {} bytes but failed to pin them", .region.len())]
    PinFailed {
        /// The unpinned but otherwise valid region.
        region: DmaRegion,
        /// The OS error from the pin attempt.
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced when releasing a region.
#[derive(Debug, Error)]
pub enum FreeError {
    /// The OS rejected the unmap call.
    #[error("munmap failed")]
    UnmapFailed(#[source] std::io::Error),
}

/// A backing strategy that obtains and releases DMA-safe memory.
///
/// Implementors define where pinned memory comes from: huge pages out of a
/// hugetlbfs mount, the heap, or anything else that yields stable physical
/// placement. Regions must be handed back to the strategy that produced
/// them; the [`crate::memory::Backing`] tag on each region guards against
/// crossing them up.
///
/// # Associated Types
///
/// * `Error` - The error type returned by allocation operations. Must
///   implement [`std::error::Error`].
pub trait DmaAllocator {
    /// The error type returned by allocation operations.
    type Error: std::error::Error;

    /// Effective page size of this backing in bytes.
    ///
    /// Region lengths are rounded up to a multiple of this.
    fn granularity(&self) -> usize;

    /// Allocates a region of at least `size` bytes suitable for DMA.
    ///
    /// # Errors
    ///
    /// May return an error if the backing is unavailable on this system,
    /// the request cannot be satisfied as specified, or an OS call fails.
    fn allocate(&mut self, size: usize) -> Result<DmaRegion, Self::Error>;

    /// Releases a region previously produced by this strategy.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS rejects the release.
    fn free(&mut self, region: DmaRegion) -> Result<(), FreeError>;
}

/// Errors from [`allocate_dma`].
#[derive(Debug, Error)]
pub enum DmaError<E: std::error::Error> {
    /// The backing strategy failed; nothing was allocated.
    #[error(transparent)]
    Alloc(E),
    /// The region was allocated but its physical base could not be
    /// resolved. The region rides along so the caller can keep or free it.
    #[error("allocated but could not resolve the physical base address")]
    Translate {
        /// The allocated region.
        region: DmaRegion,
        /// The translation failure.
        #[source]
        source: TranslationError,
    },
}

/// Allocates a region and resolves the physical address of its base.
///
/// This is the entry point for descriptor-ring and packet-buffer setup:
/// the returned pair carries the virtual-side region plus the physical
/// base address to program into hardware.
///
/// # Arguments
///
/// * `allocator` - The backing strategy to allocate from.
/// * `size` - Requested size in bytes; rounded up to the strategy's
///   granularity.
///
/// # Errors
///
/// Returns [`DmaError::Alloc`] when the strategy fails, or
/// [`DmaError::Translate`] (carrying the live region) when the physical
/// base cannot be resolved.
pub fn allocate_dma<E: std::error::Error>(
    allocator: &mut dyn DmaAllocator<Error = E>,
    size: usize,
) -> Result<DmaMemory, DmaError<E>> {
    assert!(size > 0, "size must be greater than 0");
    let region = allocator.allocate(size).map_err(DmaError::Alloc)?;
    let mut resolver = match PagemapResolver::new() {
        Ok(resolver) => resolver,
        Err(source) => return Err(DmaError::Translate { region, source }),
    };
    let phys = match resolver.virt_to_phys(region.addr()) {
        Ok(phys) => phys,
        Err(source) => return Err(DmaError::Translate { region, source }),
    };
    debug!(
        "allocated {} bytes at 0x{:x}, physical base {:?}",
        region.len(),
        region.addr(),
        phys
    );
    Ok(DmaMemory { region, phys })
}
