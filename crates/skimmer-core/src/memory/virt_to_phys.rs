use std::fmt::{Debug, Formatter};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::{Add, Sub};

use log::warn;
use thiserror::Error;

use super::page_facts::{address_width, base_page_size};

/// Physical memory address.
///
/// A newtype wrapper around a physical address value.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysAddr(usize);

impl Debug for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("PhysAddr(0x{:02x})", self.0))
    }
}

impl PhysAddr {
    /// Creates a new physical address.
    pub fn new(addr: usize) -> Self {
        PhysAddr(addr)
    }

    /// Returns the address as a usize.
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl From<PhysAddr> for usize {
    fn from(addr: PhysAddr) -> usize {
        addr.0
    }
}

impl Add<usize> for PhysAddr {
    type Output = PhysAddr;

    fn add(self, rhs: usize) -> Self::Output {
        PhysAddr(self.0 + rhs)
    }
}

impl Sub<PhysAddr> for PhysAddr {
    type Output = PhysAddr;

    fn sub(self, rhs: PhysAddr) -> Self::Output {
        assert!(self.0 >= rhs.0);
        PhysAddr(self.0 - rhs.0)
    }
}

/// Errors that can occur during virtual-to-physical translation.
#[derive(Debug, Error)]
pub enum TranslationError {
    /// The kernel's page-table introspection interface could not be opened.
    #[error("pagemap interface is unavailable")]
    Unavailable(#[source] std::io::Error),
    /// Seeking to or reading the page-table entry failed.
    #[error("pagemap lookup failed for virtual address 0x{addr:x}")]
    Failed {
        /// Virtual address the lookup was for.
        addr: usize,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// The platform has no page-table introspection interface.
    #[error("virtual-to-physical translation is unsupported on this platform")]
    Unsupported,
}

/// Trait for resolving virtual addresses to physical addresses.
///
/// The kernel-ABI-specific page-table entry layout stays behind this seam
/// so it can be swapped per platform without touching callers. Platforms
/// without an introspection interface must fail with a typed error; a made
/// up or zero physical address is never an acceptable answer.
pub trait VirtToPhysResolver {
    /// Errors that can occur during physical address resolution.
    type Error;

    /// Translates a virtual address to a physical address.
    ///
    /// # Errors
    ///
    /// Returns an error if address translation fails.
    fn virt_to_phys(&mut self, virt: usize) -> Result<PhysAddr, Self::Error>;
}

/// Bits of a pagemap entry that hold the page frame number.
const PFN_MASK: u64 = (1 << 55) - 1;

/// Virtual to physical address translator using Linux pagemap.
///
/// Holds `/proc/<pid>/pagemap` open across lookups. Frame numbers read
/// without root privileges come back as zero.
pub struct PagemapResolver {
    pagemap: File,
}

impl PagemapResolver {
    /// Opens the pagemap of the current process.
    ///
    /// # Errors
    ///
    /// Returns [`TranslationError::Unavailable`] if the interface cannot
    /// be opened.
    pub fn new() -> Result<Self, TranslationError> {
        Self::for_process(std::process::id())
    }

    /// Opens the pagemap of a specific process.
    ///
    /// # Arguments
    ///
    /// * `pid` - Process ID to open the pagemap for
    #[cfg(target_os = "linux")]
    pub fn for_process(pid: u32) -> Result<Self, TranslationError> {
        let pagemap =
            File::open(format!("/proc/{pid}/pagemap")).map_err(TranslationError::Unavailable)?;
        Ok(PagemapResolver { pagemap })
    }

    /// Opens the pagemap of a specific process.
    #[cfg(not(target_os = "linux"))]
    pub fn for_process(_pid: u32) -> Result<Self, TranslationError> {
        Err(TranslationError::Unsupported)
    }
}

impl VirtToPhysResolver for PagemapResolver {
    type Error = TranslationError;

    fn virt_to_phys(&mut self, virt: usize) -> Result<PhysAddr, TranslationError> {
        let page_size = base_page_size() as usize;
        let width = address_width() as usize;
        let entry_offset = (virt / page_size) as u64 * width as u64;
        self.pagemap
            .seek(SeekFrom::Start(entry_offset))
            .map_err(|source| TranslationError::Failed { addr: virt, source })?;
        let mut entry = [0u8; 8];
        self.pagemap
            .read_exact(&mut entry[..width])
            .map_err(|source| TranslationError::Failed { addr: virt, source })?;
        let entry = u64::from_ne_bytes(entry);
        if entry & PFN_MASK == 0 {
            warn!(
                "got frame number 0 for virtual address 0x{:x}, reading pagemap usually needs root",
                virt
            );
        }
        Ok(PhysAddr(phys_from_entry(entry, virt, page_size)))
    }
}

/// Applies the pagemap entry layout: the low 55 bits are the page frame
/// number, the in-page offset carries over from the virtual address.
fn phys_from_entry(entry: u64, virt: usize, page_size: usize) -> usize {
    let pfn = (entry & PFN_MASK) as usize;
    pfn * page_size + virt % page_size
}

/// Translates a virtual address of the current process, opening the
/// pagemap for this single lookup.
///
/// Use [`PagemapResolver`] directly when translating many addresses.
///
/// # Errors
///
/// Returns an error if the pagemap cannot be opened or the lookup fails.
pub fn virt_to_phys(virt: usize) -> Result<PhysAddr, TranslationError> {
    PagemapResolver::new()?.virt_to_phys(virt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_layout() {
        // frame number in the low 55 bits, flag bits above are ignored
        let entry = (1u64 << 63) | (1 << 62) | 0x1234;
        assert_eq!(phys_from_entry(entry, 0, 4096), 0x1234 * 4096);
        assert_eq!(phys_from_entry(entry, 0x7ff, 4096), 0x1234 * 4096 + 0x7ff);
        // the in-page offset survives a zero frame number
        assert_eq!(phys_from_entry(0, 0xabc, 4096), 0xabc);
    }

    #[test]
    fn pfn_mask_width() {
        assert_eq!(PFN_MASK, 0x7f_ffff_ffff_ffff);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn resolve_own_stack() -> anyhow::Result<()> {
        let mut resolver = PagemapResolver::new()?;
        let local = 0u64;
        let virt = &local as *const u64 as usize;
        let phys = resolver.virt_to_phys(virt)?;
        // without root the frame number reads as zero, the in-page offset
        // is preserved either way
        assert_eq!(
            phys.as_usize() % base_page_size() as usize,
            virt % base_page_size() as usize
        );
        Ok(())
    }

    #[test]
    fn phys_addr_arithmetic() {
        let base = PhysAddr::new(0x4000);
        assert_eq!((base + 0x200).as_usize(), 0x4200);
        assert_eq!((PhysAddr::new(0x4200) - base).as_usize(), 0x200);
    }
}
