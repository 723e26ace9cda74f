use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use libc::{MAP_HUGETLB, MAP_LOCKED, MAP_NORESERVE, MAP_SHARED, O_CREAT, O_RDWR};
use log::{debug, warn};
use skimmer_core::allocator::{AllocError, DmaAllocator, FreeError};
use skimmer_core::memory::{Backing, DmaRegion, HUGE_PAGE_MOUNT, huge_page_size};

/// Huge page allocation id counter.
///
/// Embedded into backing-file names together with the process id, which
/// keeps names collision-free across threads and processes. Never reused.
static HUGEPAGE_ID: AtomicU64 = AtomicU64::new(0);

/// Huge-page-backed memory allocator.
///
/// Each allocation creates a uniquely named file in the hugetlbfs mount,
/// sizes it, maps it shared and locked, then closes and unlinks the file.
/// The kernel keeps the pages alive for the lifetime of the mapping, so
/// nothing of the file outlives the call except the mapping itself.
#[derive(Debug, Clone)]
pub struct HugepageAllocator {
    mount: PathBuf,
}

impl Default for HugepageAllocator {
    fn default() -> Self {
        Self::with_mount(HUGE_PAGE_MOUNT)
    }
}

impl HugepageAllocator {
    /// Creates an allocator backed by the default hugetlbfs mount.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an allocator placing backing files under `mount`.
    ///
    /// The mount must be a `hugetlbfs` filesystem; files created on
    /// anything else will not map with huge-page semantics.
    pub fn with_mount(mount: impl Into<PathBuf>) -> Self {
        HugepageAllocator {
            mount: mount.into(),
        }
    }

    /// Allocates `size` bytes of huge-page-backed, pinned memory.
    ///
    /// The returned region length is `size` rounded up to the huge page
    /// size. With `require_contiguous`, requests beyond a single huge page
    /// are rejected: one huge page is the largest region this allocator
    /// can guarantee physically contiguous.
    ///
    /// # Errors
    ///
    /// [`AllocError::Unsupported`] without huge-page support,
    /// [`AllocError::ContiguityUnavailable`] for oversized contiguous
    /// requests, [`AllocError::AllocationFailed`] when an OS call fails.
    /// A failed pin is not fatal; it is logged and the region reports
    /// `pinned: false`.
    pub fn allocate(&self, size: usize, require_contiguous: bool) -> Result<DmaRegion, AllocError> {
        let len = plan(size, require_contiguous, huge_page_size())?;
        map_backing_file(&self.backing_path(), len, require_contiguous)
    }

    /// Releases a huge-page region.
    ///
    /// # Errors
    ///
    /// [`FreeError::UnmapFailed`] if the OS rejects the unmap call.
    pub fn free(&self, region: DmaRegion) -> Result<(), FreeError> {
        assert_eq!(
            region.backing(),
            Backing::HugePage,
            "region was not produced by the huge-page allocator"
        );
        // re-round: regions assembled from raw parts may carry a raw size
        let huge_size = huge_page_size().max(1) as usize;
        let len = region.len().next_multiple_of(huge_size);
        let status = unsafe { libc::munmap(region.addr() as *mut libc::c_void, len) };
        if status != 0 {
            return Err(FreeError::UnmapFailed(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn backing_path(&self) -> PathBuf {
        let id = HUGEPAGE_ID.fetch_add(1, Ordering::SeqCst);
        self.mount
            .join(format!("skimmer-{}-{}", std::process::id(), id))
    }
}

/// Fail-fast checks and rounding, split off from the syscall path.
fn plan(size: usize, require_contiguous: bool, huge_size: i64) -> Result<usize, AllocError> {
    if huge_size <= 0 {
        return Err(AllocError::Unsupported);
    }
    let huge_size = huge_size as usize;
    let len = size.next_multiple_of(huge_size);
    if require_contiguous && len > huge_size {
        return Err(AllocError::ContiguityUnavailable {
            requested: len,
            huge_page_size: huge_size,
        });
    }
    Ok(len)
}

fn map_backing_file(path: &Path, len: usize, contiguous: bool) -> Result<DmaRegion, AllocError> {
    let cpath = CString::new(path.as_os_str().as_encoded_bytes()).expect("CString");

    let fd = unsafe { libc::open(cpath.as_ptr(), O_CREAT | O_RDWR, libc::S_IRWXU) };
    // a descriptor of 0 is valid, only -1 signals failure
    if fd == -1 {
        return Err(alloc_failed("creating the backing file"));
    }

    if unsafe { libc::ftruncate(fd, len as libc::off_t) } != 0 {
        let err = alloc_failed("sizing the backing file");
        unsafe { libc::close(fd) };
        remove_backing(&cpath);
        return Err(err);
    }

    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            MAP_SHARED | MAP_HUGETLB | MAP_LOCKED | MAP_NORESERVE,
            fd,
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        let err = alloc_failed("mapping the backing file");
        unsafe { libc::close(fd) };
        remove_backing(&cpath);
        return Err(err);
    }

    // MAP_LOCKED alone is not guaranteed to pin on all kernels; lock
    // explicitly and degrade to a swappable region if that is refused
    let pinned = unsafe { libc::mlock(addr, len) } == 0;
    if !pinned {
        warn!(
            "failed to pin {} bytes at 0x{:x}: {}",
            len,
            addr as usize,
            std::io::Error::last_os_error()
        );
    }

    if unsafe { libc::close(fd) } != 0 {
        warn!(
            "failed to close the backing file: {}",
            std::io::Error::last_os_error()
        );
    }
    // the mapping keeps the pages alive; removing the name stops any other
    // process from mapping the same file
    remove_backing(&cpath);

    debug!(
        "allocated {} huge-page bytes at 0x{:x} (pinned: {})",
        len, addr as usize, pinned
    );
    Ok(DmaRegion::from_raw_parts(
        addr as usize,
        len,
        Backing::HugePage,
        pinned,
        contiguous,
    ))
}

fn alloc_failed(stage: &'static str) -> AllocError {
    AllocError::AllocationFailed {
        stage,
        source: std::io::Error::last_os_error(),
    }
}

fn remove_backing(path: &CString) {
    if unsafe { libc::unlink(path.as_ptr()) } != 0 {
        warn!(
            "failed to remove the backing file: {}",
            std::io::Error::last_os_error()
        );
    }
}

impl DmaAllocator for HugepageAllocator {
    type Error = AllocError;

    fn granularity(&self) -> usize {
        huge_page_size().max(0) as usize
    }

    fn allocate(&mut self, size: usize) -> Result<DmaRegion, AllocError> {
        // descriptor rings and packet buffers rely on the contiguity
        // guarantee; larger non-contiguous regions go through the
        // inherent method
        HugepageAllocator::allocate(self, size, true)
    }

    fn free(&mut self, region: DmaRegion) -> Result<(), FreeError> {
        HugepageAllocator::free(self, region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    const HUGE_2M: i64 = 2 * 1024 * 1024;

    #[test]
    fn plan_rejects_unsupported() {
        assert!(matches!(plan(100, false, -1), Err(AllocError::Unsupported)));
        assert!(matches!(plan(100, true, 0), Err(AllocError::Unsupported)));
    }

    #[test]
    fn plan_rounds_to_the_huge_page_size() {
        assert_eq!(plan(100, true, HUGE_2M).expect("plan"), HUGE_2M as usize);
        assert_eq!(plan(1, false, HUGE_2M).expect("plan"), HUGE_2M as usize);
        assert_eq!(
            plan(HUGE_2M as usize, true, HUGE_2M).expect("plan"),
            HUGE_2M as usize
        );
        assert_eq!(
            plan(HUGE_2M as usize + 1, false, HUGE_2M).expect("plan"),
            2 * HUGE_2M as usize
        );
    }

    #[test]
    fn plan_guards_contiguity() {
        let err = plan(4 * 1024 * 1024, true, HUGE_2M).expect_err("plan");
        assert!(matches!(
            err,
            AllocError::ContiguityUnavailable {
                requested: 4194304,
                huge_page_size: 2097152,
            }
        ));
        // the same size without the guarantee passes
        assert_eq!(
            plan(4 * 1024 * 1024, false, HUGE_2M).expect("plan"),
            4 * 1024 * 1024
        );
    }

    #[test]
    fn backing_names_are_unique_across_threads() {
        let allocator = HugepageAllocator::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = allocator.clone();
                thread::spawn(move || (0..64).map(|_| allocator.backing_path()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for path in handle.join().expect("thread") {
                assert!(seen.insert(path.clone()), "duplicate backing path {path:?}");
            }
        }
        assert_eq!(seen.len(), 8 * 64);
    }

    #[test]
    fn backing_names_embed_the_pid() {
        let path = HugepageAllocator::new().backing_path();
        let name = path.file_name().expect("file name").to_string_lossy();
        assert!(name.starts_with(&format!("skimmer-{}-", std::process::id())));
        assert!(path.starts_with(HUGE_PAGE_MOUNT));
    }
}
