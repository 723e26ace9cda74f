//! Shared mappings over caller-owned file and device handles.
//!
//! Used when the backing storage is obtained out of band: a PCI resource
//! file for register access, or a hugetlbfs file some other process
//! created. The handle stays owned by the caller the whole time; mapping
//! neither closes nor duplicates it.

use std::os::fd::{AsRawFd, BorrowedFd};
use std::ptr::null_mut;

use log::debug;

use super::page_facts::{base_page_size, huge_page_size};
use super::region::{Backing, DmaRegion};
use crate::allocator::{AllocError, FreeError};

/// Maps `size` bytes of an already-open handle with shared semantics.
///
/// `huge` requests huge-page mapping flags and requires huge-page support;
/// `pinned` asks the kernel to reserve and lock the pages for the lifetime
/// of the mapping. The returned region length is `size` rounded up to the
/// effective page size.
///
/// # Errors
///
/// Returns [`AllocError::Unsupported`] when `huge` is requested without
/// huge-page support, or [`AllocError::AllocationFailed`] when the mapping
/// itself fails.
pub fn map_resource(
    fd: BorrowedFd<'_>,
    size: usize,
    huge: bool,
    pinned: bool,
) -> Result<DmaRegion, AllocError> {
    let page_size = if huge {
        let huge_size = huge_page_size();
        if huge_size <= 0 {
            return Err(AllocError::Unsupported);
        }
        huge_size as usize
    } else {
        base_page_size() as usize
    };
    let len = size.next_multiple_of(page_size);

    let mut flags = libc::MAP_SHARED;
    if huge {
        flags |= libc::MAP_HUGETLB;
    }
    if pinned {
        flags |= libc::MAP_LOCKED | libc::MAP_NORESERVE;
    }
    let addr = unsafe {
        libc::mmap(
            null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            flags,
            fd.as_raw_fd(),
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(AllocError::AllocationFailed {
            stage: "mapping the resource handle",
            source: std::io::Error::last_os_error(),
        });
    }
    debug!(
        "mapped fd {} at 0x{:x} ({} bytes, huge: {}, pinned: {})",
        fd.as_raw_fd(),
        addr as usize,
        len,
        huge,
        pinned
    );
    Ok(DmaRegion::from_raw_parts(
        addr as usize,
        len,
        Backing::FileMapped,
        pinned,
        false,
    ))
}

/// Releases a mapping created by [`map_resource`].
///
/// The underlying handle stays open; closing it is the caller's business.
///
/// # Errors
///
/// Returns [`FreeError::UnmapFailed`] if the OS rejects the unmap call.
pub fn unmap_resource(region: DmaRegion) -> Result<(), FreeError> {
    assert_eq!(
        region.backing(),
        Backing::FileMapped,
        "region was not produced by map_resource"
    );
    let status = unsafe { libc::munmap(region.addr() as *mut libc::c_void, region.len()) };
    if status != 0 {
        return Err(FreeError::UnmapFailed(std::io::Error::last_os_error()));
    }
    Ok(())
}
