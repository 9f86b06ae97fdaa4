//! Per-address-space virtual memory pools.
//!
//! A [`VmPool`] owns a window of virtual addresses and hands out regions
//! from it. Allocation is pure bookkeeping; the backing frames only appear
//! when the pages fault in, and releasing a region walks its pages through
//! [`PageTable::free_page`].

use muon_core::addr::VirtAddr;
use muon_core::paging::{PAGE_SIZE, Page};
use muon_core::{kdebug, kinfo};
use planck_noalloc::vec::ArrayVec;

use crate::MAX_VM_REGIONS;
use crate::layout::VirtRegion;
use crate::page_table::PageTable;
use crate::pools::{PoolHandle, PoolRegistry};

/// One handed-out region, `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Region {
    start: VirtAddr,
    end: VirtAddr,
}

/// An allocator for regions of a virtual address window.
pub struct VmPool {
    window: VirtRegion,
    backing: PoolHandle,
    regions: ArrayVec<Region, MAX_VM_REGIONS>,
}

impl VmPool {
    /// Creates a pool over the window `[base, base + size)` and registers it
    /// with the owning address space.
    ///
    /// `backing` records which physical pool the window's pages draw from.
    ///
    /// # Panics
    ///
    /// Panics if `base` or `size` is not page-aligned, if `size` is zero, or
    /// if the window overlaps one already registered with `table`.
    pub fn new(base: VirtAddr, size: u32, backing: PoolHandle, table: &mut PageTable) -> Self {
        assert!(
            base.is_aligned(PAGE_SIZE),
            "pool window base {base} is not page-aligned"
        );
        assert!(
            size > 0 && size % PAGE_SIZE == 0,
            "pool window size {size:#x} is not a positive page multiple"
        );
        let window = VirtRegion::new(base, size);
        for other in table.vm_windows() {
            assert!(
                !window.overlaps(*other),
                "pool window at {base} overlaps an existing pool"
            );
        }
        table.register_pool(window);
        kinfo!("mm: virtual pool over [{base}, {:#x})", window.end());
        Self {
            window,
            backing,
            regions: ArrayVec::new(),
        }
    }

    /// Allocates a region of at least `size` bytes, returning its start.
    ///
    /// The size is rounded up to whole pages and placed first-fit: the
    /// lowest gap between existing regions (or after the last one) that
    /// fits. Returns `None` when no gap is large enough or the region list
    /// is full; a failed allocation changes nothing.
    pub fn allocate(&mut self, size: u32) -> Option<VirtAddr> {
        assert!(size > 0, "cannot allocate an empty region");
        let bytes = size.checked_add(PAGE_SIZE - 1)? & !(PAGE_SIZE - 1);
        if self.regions.is_full() {
            kdebug!("mm: virtual pool at {} has no free region slots", self.window.base());
            return None;
        }

        // Regions are kept sorted by start, so the gaps can be walked in
        // address order.
        let mut gap_start = self.window.base().as_u32();
        for index in 0..=self.regions.len() {
            let gap_end = if index < self.regions.len() {
                self.regions[index].start.as_u32()
            } else {
                self.window.end()
            };
            if gap_end - gap_start >= bytes {
                let start = VirtAddr::new(gap_start);
                self.regions.insert(
                    index,
                    Region {
                        start,
                        end: VirtAddr::new(gap_start + bytes),
                    },
                );
                return Some(start);
            }
            if index < self.regions.len() {
                gap_start = self.regions[index].end.as_u32();
            }
        }

        kdebug!(
            "mm: virtual pool at {} exhausted ({bytes:#x} bytes requested)",
            self.window.base()
        );
        None
    }

    /// Releases the region starting at `start`.
    ///
    /// Every page of the region is unmapped through `table`; pages that
    /// never faulted in are skipped harmlessly.
    ///
    /// # Panics
    ///
    /// Panics if `start` is not the start of a live region.
    pub fn release(&mut self, start: VirtAddr, table: &mut PageTable, pools: &mut PoolRegistry) {
        let index = self
            .regions
            .iter()
            .position(|region| region.start == start)
            .unwrap_or_else(|| panic!("{start} is not the start of an allocated region"));
        let region = self.regions.remove(index);
        for page in Page::range(Page::containing(region.start), Page::containing(region.end)) {
            table.free_page(page, pools);
        }
    }

    /// Whether `addr` lies inside a live region.
    ///
    /// The fault handler uses this to tell a demand-paged access from a wild
    /// one.
    pub fn is_legitimate(&self, addr: VirtAddr) -> bool {
        self.regions
            .iter()
            .any(|region| addr >= region.start && addr < region.end)
    }

    /// The window of virtual addresses this pool manages.
    pub fn window(&self) -> VirtRegion {
        self.window
    }

    /// The physical pool backing this window's pages.
    pub fn backing_pool(&self) -> PoolHandle {
        self.backing
    }

    /// The number of live regions.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}
