use rand::{Rng, rng};
use skimmer::allocator::{AllocError, DmaAllocator, allocate_dma};
use skimmer::memory::{self, Backing, access, base_page_size, huge_page_size};
use skimmer_heap::HeapAllocator;
use skimmer_hugepage::HugepageAllocator;

#[test]
fn heap_roundtrip_all_widths() -> anyhow::Result<()> {
    let allocator = HeapAllocator::new();
    let region = allocator.allocate(4096, false)?;
    let mut rand = rng();
    for _ in 0..1000 {
        let offset = rand.random_range(0..4096 - 8) & !7;
        let addr = region.addr_at(offset);
        unsafe {
            let v: u64 = rand.random();
            access::store::<u64>(addr, v);
            assert_eq!(access::load::<u64>(addr), v);
            let v: u32 = rand.random();
            access::store_volatile::<u32>(addr, v);
            assert_eq!(access::load_volatile::<u32>(addr), v);
            let v: u16 = rand.random();
            access::store::<u16>(addr, v);
            assert_eq!(access::load::<u16>(addr), v);
            let v: u8 = rand.random();
            access::store_volatile::<u8>(addr, v);
            assert_eq!(access::load_volatile::<u8>(addr), v);
        }
    }
    allocator.free(region);
    Ok(())
}

#[test]
fn heap_bulk_copies() -> anyhow::Result<()> {
    let allocator = HeapAllocator::new();
    let region = allocator.allocate(4096, false)?;
    let pattern: Vec<u8> = (0..=255).collect();
    unsafe {
        access::copy_to(region.addr(), &pattern);
        let mut out = vec![0u8; pattern.len()];
        access::copy_from(region.addr(), &mut out);
        assert_eq!(out, pattern);

        access::copy_volatile(region.addr(), region.addr_at(1024), pattern.len());
        let mut out = vec![0u8; pattern.len()];
        access::copy_from_volatile(region.addr_at(1024), &mut out);
        assert_eq!(out, pattern);
    }
    allocator.free(region);
    Ok(())
}

#[test]
fn nonatomic_counters_behave_sequentially() -> anyhow::Result<()> {
    let allocator = HeapAllocator::new();
    let region = allocator.allocate(64, false)?;
    let addr = region.addr();
    unsafe {
        access::store::<u64>(addr, 40);
        assert_eq!(access::fetch_add::<u64>(addr, 2), 40);
        assert_eq!(access::add_fetch::<u64>(addr, 2), 44);
        assert_eq!(access::swap::<u64>(addr, 7), 44);
        assert_eq!(access::load::<u64>(addr), 7);
    }
    allocator.free(region);
    Ok(())
}

#[test]
fn translation_preserves_the_page_offset() -> anyhow::Result<()> {
    let allocator = HeapAllocator::new();
    let region = allocator.allocate(4096, false)?;
    let virt = region.addr_at(100);
    let phys = memory::virt_to_phys(virt)?;
    // frame numbers need root, the in-page offset never does
    assert_eq!(
        phys.as_usize() % base_page_size() as usize,
        virt % base_page_size() as usize
    );
    allocator.free(region);
    Ok(())
}

#[test]
fn oversized_contiguous_requests_never_succeed() {
    let allocator = HugepageAllocator::new();
    let huge_size = huge_page_size();
    let request = usize::try_from(huge_size.max(1)).expect("huge page size") * 2;
    match allocator.allocate(request, true) {
        Err(AllocError::Unsupported) => assert!(huge_size <= 0),
        Err(AllocError::ContiguityUnavailable { .. }) => assert!(huge_size > 0),
        Ok(region) => panic!(
            "got a region at 0x{:x} for an unsatisfiable request",
            region.addr()
        ),
        Err(e) => panic!("unexpected error: {e}"),
    }
}

#[test]
#[ignore] // needs hugetlbfs mounted at /mnt/huge and enough free huge pages
fn hugepage_end_to_end() -> anyhow::Result<()> {
    env_logger::init();
    let huge_size = huge_page_size();
    anyhow::ensure!(huge_size > 0, "huge pages unavailable on this system");
    let huge_size = huge_size as usize;

    let allocator = HugepageAllocator::new();
    let region = allocator.allocate(100, true)?;
    assert_eq!(region.len(), huge_size);
    assert_eq!(region.backing(), Backing::HugePage);
    assert!(region.is_contiguous());
    unsafe {
        access::store::<u64>(region.addr(), 0x1122_3344_5566_7788);
        assert_eq!(access::load::<u64>(region.addr()), 0x1122_3344_5566_7788);
        access::store_volatile::<u32>(region.addr_at(huge_size / 2), 0xabad_1dea);
        assert_eq!(
            access::load_volatile::<u32>(region.addr_at(huge_size / 2)),
            0xabad_1dea
        );
    }
    allocator.free(region)?;
    Ok(())
}

#[test]
#[ignore] // needs hugetlbfs, free huge pages and root for real frame numbers
fn physical_offsets_within_a_huge_page() -> anyhow::Result<()> {
    let huge_size = huge_page_size();
    anyhow::ensure!(huge_size > 0, "huge pages unavailable on this system");
    let huge_size = huge_size as usize;

    let allocator = HugepageAllocator::new();
    let region = allocator.allocate(huge_size, true)?;
    let base = memory::virt_to_phys(region.addr())?;
    let middle = memory::virt_to_phys(region.addr_at(huge_size / 2))?;
    // a single huge page is physically contiguous, so virtual and
    // physical offsets must agree across it
    assert_eq!((middle - base).as_usize(), huge_size / 2);
    allocator.free(region)?;
    Ok(())
}

#[test]
#[ignore] // needs hugetlbfs, free huge pages and root
fn dma_allocation_resolves_the_physical_base() -> anyhow::Result<()> {
    let mut allocator = HugepageAllocator::new();
    let dma = match allocate_dma(&mut allocator, 2048) {
        Ok(dma) => dma,
        Err(e) => anyhow::bail!("dma allocation failed: {e}"),
    };
    assert_ne!(dma.phys.as_usize(), 0);
    assert_eq!(dma.region.len() % allocator.granularity(), 0);
    allocator.free(dma.region)?;
    Ok(())
}

#[test]
#[ignore] // needs hugetlbfs and free huge pages
fn free_then_reallocate() -> anyhow::Result<()> {
    let huge_size = huge_page_size();
    anyhow::ensure!(huge_size > 0, "huge pages unavailable on this system");

    let allocator = HugepageAllocator::new();
    let region = allocator.allocate(100, true)?;
    allocator.free(region)?;
    // the backing file was unlinked during the first allocation, a fresh
    // one must come up under a new name
    let region = allocator.allocate(100, true)?;
    assert_eq!(region.len(), huge_size as usize);
    allocator.free(region)?;
    Ok(())
}
