use std::path::Path;

use lazy_static::lazy_static;

// https://www.kernel.org/doc/Documentation/vm/hugetlbpage.txt
//
// The output of "cat /proc/meminfo" will include lines like:
// ...
// HugePages_Total: uuu
// HugePages_Free:  vvv
// Hugepagesize:    yyy kB

const MEMINFO_PATH: &str = "/proc/meminfo";
const MOUNTS_PATH: &str = "/proc/mounts";
const TOKEN: &str = "Hugepagesize:";

/// Mount point the huge-page support probe expects `hugetlbfs` at.
///
/// Backing files of the huge-page allocator also default to this mount.
pub const HUGE_PAGE_MOUNT: &str = "/mnt/huge";

lazy_static! {
    static ref HUGE_PAGE_SIZE: i64 = probe_huge_page_size();
}

/// Returns the base page size of the operating system in bytes.
pub fn base_page_size() -> u32 {
    // _SC_PAGESIZE cannot fail on any supported platform
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u32 }
}

/// Returns the native pointer width in bytes.
///
/// Pagemap entries are read at this width, one entry per base page.
pub const fn address_width() -> u32 {
    size_of::<usize>() as u32
}

/// Returns the huge page size of the operating system in bytes.
///
/// `-1` means huge pages are unsupported (no `hugetlbfs` mounted at
/// [`HUGE_PAGE_MOUNT`]), `0` means support exists but the size could not
/// be determined from `/proc/meminfo`. Probed once and cached for the
/// process lifetime; the value does not change while the process runs.
pub fn huge_page_size() -> i64 {
    *HUGE_PAGE_SIZE
}

#[cfg(target_os = "linux")]
fn probe_huge_page_size() -> i64 {
    let mounts = std::fs::read_to_string(MOUNTS_PATH).unwrap_or_default();
    if !hugetlbfs_mounted(&mounts, Path::new(HUGE_PAGE_MOUNT)) {
        return -1;
    }
    let meminfo = std::fs::read_to_string(MEMINFO_PATH).unwrap_or_default();
    parse_huge_page_size(&meminfo)
}

#[cfg(not(target_os = "linux"))]
fn probe_huge_page_size() -> i64 {
    -1
}

/// Checks the mount table for a `hugetlbfs` entry at `mount`.
///
/// Device, mount point and filesystem type all have to match; a tmpfs
/// bind-mounted over the expected directory does not count.
fn hugetlbfs_mounted(mounts: &str, mount: &Path) -> bool {
    // /proc/mounts lines: "<device> <dir> <type> <options> <dump> <pass>"
    for line in mounts.lines() {
        let mut fields = line.split_whitespace();
        let (Some(device), Some(dir), Some(fstype)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if device == "hugetlbfs" && fstype == "hugetlbfs" && Path::new(dir) == mount {
            return true;
        }
    }
    false
}

fn parse_huge_page_size(meminfo: &str) -> i64 {
    for line in meminfo.lines() {
        let Some(rest) = line.strip_prefix(TOKEN) else {
            continue;
        };
        let mut parts = rest.split_whitespace();
        let value = parts.next().and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
        let multiplier = parts.next().map_or(1, |unit| match unit.chars().next() {
            Some('G') => 1 << 30,
            Some('M') => 1 << 20,
            Some('k') => 1 << 10,
            _ => 1,
        });
        return value * multiplier;
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_meminfo_units() {
        assert_eq!(parse_huge_page_size("Hugepagesize:    2048 kB"), 2 << 20);
        assert_eq!(parse_huge_page_size("Hugepagesize: 1048576 kB"), 1 << 30);
        assert_eq!(parse_huge_page_size("Hugepagesize: 2 M"), 2 << 20);
        assert_eq!(parse_huge_page_size("Hugepagesize: 1 G"), 1 << 30);
        assert_eq!(parse_huge_page_size("Hugepagesize: 4096"), 4096);
    }

    #[test]
    fn parse_meminfo_missing_field() {
        assert_eq!(parse_huge_page_size("MemTotal: 16384 kB\nMemFree: 1024 kB"), 0);
        assert_eq!(parse_huge_page_size(""), 0);
    }

    #[test]
    fn mount_table_matching() {
        let mounts = "hugetlbfs /mnt/huge hugetlbfs rw,relatime,pagesize=2M 0 0\n\
                      tmpfs /dev/shm tmpfs rw,nosuid,nodev 0 0";
        assert!(hugetlbfs_mounted(mounts, Path::new("/mnt/huge")));
        assert!(!hugetlbfs_mounted(mounts, Path::new("/dev/hugepages")));
        assert!(!hugetlbfs_mounted(
            "tmpfs /mnt/huge tmpfs rw 0 0",
            Path::new("/mnt/huge")
        ));
        assert!(!hugetlbfs_mounted("", Path::new("/mnt/huge")));
    }

    #[test]
    fn page_facts_are_sane() {
        assert!(base_page_size().is_power_of_two());
        assert!(address_width() == 4 || address_width() == 8);
        // cached probe is idempotent
        assert_eq!(huge_page_size(), huge_page_size());
    }
}
