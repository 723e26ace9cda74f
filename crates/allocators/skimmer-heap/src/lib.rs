//! Heap backing strategy for Skimmer DMA memory.
//!
//! The fallback path when huge pages are not required: plain heap
//! allocation with optional pinning against swap. Physical contiguity is
//! never guaranteed here.
//!
//! Implements the [`skimmer_core::allocator::DmaAllocator`] trait.

#![warn(missing_docs)]

mod heap;

pub use heap::HeapAllocator;
