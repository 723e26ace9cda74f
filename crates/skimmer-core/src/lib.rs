//! # Skimmer Core
//!
//! `skimmer-core` is the foundational library for the Skimmer userspace
//! packet I/O framework. Network hardware reads and writes memory over DMA
//! without going through the MMU, so every buffer handed to a device must
//! be pinned against swap, its physical layout must be known, and its
//! accesses must be ordered the way the hardware expects. The types in
//! this crate carry those guarantees.
//!
//! ## Architecture Overview
//!
//! The crate is built around three seams:
//!
//! - [`allocator::DmaAllocator`] - Defines the backing strategies that
//!   obtain pinned memory regions. The huge-page and heap strategies live
//!   in their own crates under `crates/allocators/`.
//!
//! - [`memory::VirtToPhysResolver`] - Defines the translation of virtual
//!   addresses to the physical addresses programmed into hardware
//!   descriptors. The kernel-ABI-specific page-table entry layout stays
//!   behind this trait so it can be swapped per platform.
//!
//! - [`memory::access`] - Typed raw loads and stores, their volatile,
//!   fenced variants for memory-mapped registers, and bulk copies. The
//!   sole module allowed to dereference region addresses.
//!
//! ## Main Components
//!
//! - [`memory`] module - Provides [`memory::DmaRegion`] and
//!   [`memory::DmaMemory`], the platform page facts, the pagemap
//!   translator, and shared mappings over caller-owned handles.
//!
//! - [`allocator`] module - Contains the strategy trait, the allocation
//!   error taxonomy, and the [`allocator::allocate_dma`] entry point.
//!
//! ## Platform Support
//!
//! Designed for x86_64 Linux systems with `hugetlbfs` and
//! `/proc/<pid>/pagemap`. Reading page frame numbers from pagemap requires
//! root privileges; huge pages must be configured at boot or runtime.

#![warn(missing_docs)]

pub mod allocator;
pub mod memory;
