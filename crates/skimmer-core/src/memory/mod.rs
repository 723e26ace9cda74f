//! Memory regions, platform page facts, address translation and raw access.
//!
//! The `memory` module provides the following abstractions:
//! - [`DmaRegion`]: an allocated region with its backing, pin and contiguity state.
//! - [`DmaMemory`]: a region paired with the physical address of its base.
//! - [`PhysAddr`]: a physical memory address.
//! - [`VirtToPhysResolver`]: a trait for resolving virtual to physical addresses.
//! - [`PagemapResolver`]: the Linux pagemap implementation of that trait.
//! - [`access`]: the raw typed accessor, sole holder of dereference rights.
//!
//! The `memory` module also provides the following helper functions:
//! - [`map_resource`]/[`unmap_resource`]: shared mappings over caller-owned handles.
//! - [`base_page_size`], [`huge_page_size`], [`address_width`]: platform page facts.
//! - [`virt_to_phys`]: one-shot translation for the current process.

mod filemap;
mod page_facts;
mod region;
mod virt_to_phys;

pub mod access;

pub use self::filemap::{map_resource, unmap_resource};
pub use self::page_facts::{HUGE_PAGE_MOUNT, address_width, base_page_size, huge_page_size};
pub use self::region::{Backing, DmaMemory, DmaRegion};
pub use self::virt_to_phys::{
    PagemapResolver, PhysAddr, TranslationError, VirtToPhysResolver, virt_to_phys,
};
