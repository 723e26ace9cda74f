//! DMA-safe memory management for the Skimmer userspace packet I/O
//! framework.
//!
//! Skimmer drives network cards directly from unprivileged processes. The
//! device reads and writes memory over DMA without going through the MMU,
//! so every buffer handed to hardware must be pinned against swap, its
//! physical layout must be known, and accesses to device-visible memory
//! must not be reordered by the compiler. This crate bundles the memory
//! side of that job:
//!
//! - obtaining large, pinned, optionally physically contiguous regions
//!   through a [`allocator::DmaAllocator`] backing strategy,
//! - translating virtual addresses to the physical addresses programmed
//!   into hardware descriptors ([`memory::VirtToPhysResolver`]),
//! - raw typed access to buffers and memory-mapped registers, plain and
//!   volatile ([`memory::access`]).
//!
//! The backing strategies live behind feature gates:
//!
//! - `hugepage` — hugetlbfs-backed, pinned, contiguity-guaranteed regions
//! - `heap` — pinned heap fallback when huge pages are not required

#![warn(missing_docs)]

pub use skimmer_core::allocator;
pub use skimmer_core::memory;

#[cfg(feature = "hugepage")]
pub use skimmer_hugepage as hugepage;

#[cfg(feature = "heap")]
pub use skimmer_heap as heap;
