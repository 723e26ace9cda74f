//! Huge-page backing strategy for Skimmer DMA memory.
//!
//! This crate obtains pinned, physically contiguous regions by mapping
//! freshly created files in a `hugetlbfs` mount. The huge page size is
//! detected from `/proc/meminfo`.
//!
//! Implements the [`skimmer_core::allocator::DmaAllocator`] trait.
//!
//! # Platform Requirements
//!
//! - x86_64 Linux with huge pages configured at boot or runtime
//! - `hugetlbfs` mounted at `/mnt/huge`, or wherever the allocator is
//!   pointed via [`HugepageAllocator::with_mount`]

#![warn(missing_docs)]

mod hugepage;

pub use hugepage::HugepageAllocator;
