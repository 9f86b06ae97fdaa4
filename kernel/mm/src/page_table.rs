//! Two-level demand-paged page tables.
//!
//! A [`PageTable`] is a page directory plus the table pages hanging off it,
//! using the classic 10/10/12 split of a 32-bit address. Nothing beyond the
//! shared kernel region is mapped up front; translations appear one page at
//! a time in [`PageTable::handle_fault`].
//!
//! The last directory slot points back at the directory itself, so once
//! translation is on, the directory appears at [`DIRECTORY_WINDOW`] and
//! table page `i` at `TABLE_WINDOW_BASE + i * PAGE_SIZE`. Before that, the
//! structures are reached through the boot-time [`DirectMap`] window.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use muon_core::addr::{PhysAddr, VirtAddr};
use muon_core::paging::{ENTRY_COUNT, Frame, PAGE_SIZE, Page};
use muon_core::{kdebug, kinfo};
use planck_noalloc::vec::ArrayVec;

use crate::MAX_VM_POOLS;
use crate::arch;
use crate::layout::{DirectMap, VirtRegion};
use crate::pools::{PoolHandle, PoolRegistry};
use crate::pte::{PageFaultCode, PageTableEntry, PageTableFlags, RawTable};

/// The directory slot that maps the directory onto itself.
pub const SELF_MAP_SLOT: usize = ENTRY_COUNT - 1;

/// Where the self-map makes the active directory visible.
pub const DIRECTORY_WINDOW: usize = 0xFFFF_F000;

/// Where the self-map makes the active table pages visible; table `i` sits
/// at `TABLE_WINDOW_BASE + i * PAGE_SIZE`.
pub const TABLE_WINDOW_BASE: usize = 0xFFC0_0000;

const NO_ACTIVE_ROOT: u32 = u32::MAX;

/// Directory frame number of the currently loaded table.
static ACTIVE_ROOT: AtomicU32 = AtomicU32::new(NO_ACTIVE_ROOT);

/// Whether address translation has been switched on.
static PAGING_ENABLED: AtomicBool = AtomicBool::new(false);

/// Parameters shared by every page table in the system.
#[derive(Clone, Copy, Debug)]
pub struct PagingConfig {
    /// Pool feeding table pages installed at fault time.
    pub kernel_pool: PoolHandle,
    /// Pool feeding directories, the identity table and data pages.
    pub process_pool: PoolHandle,
    /// Size in bytes of the identity-mapped shared kernel region.
    pub shared_size: u32,
    /// Window for reaching paging structures before translation is on.
    pub window: DirectMap,
}

/// How the table's own pages are currently reachable.
#[derive(Clone, Copy)]
enum TableView {
    /// Through the boot-time direct map.
    Direct(DirectMap),
    /// Through the recursive self-map addresses.
    Recursive,
}

/// One address space: a page directory and its demand-paged mappings.
pub struct PageTable {
    directory: Frame,
    config: PagingConfig,
    vm_windows: ArrayVec<VirtRegion, MAX_VM_POOLS>,
}

impl PageTable {
    /// Builds a fresh address space.
    ///
    /// Allocates a directory and one table page from the process pool. The
    /// table identity-maps the shared kernel region `[0, shared_size)` as
    /// present and writable; every other directory slot starts not-present,
    /// except the last, which self-maps the directory.
    ///
    /// # Panics
    ///
    /// Panics if translation is already enabled (address spaces are built
    /// during boot, while the direct window still works), if `shared_size`
    /// is zero, not page-aligned or larger than one table covers, or if the
    /// process pool cannot supply the two frames.
    pub fn new(config: &PagingConfig, pools: &mut PoolRegistry) -> Self {
        assert!(
            !paging_enabled(),
            "address spaces must be built before translation is enabled"
        );
        assert!(config.shared_size > 0, "shared kernel region cannot be empty");
        assert!(
            config.shared_size % PAGE_SIZE == 0,
            "shared kernel region size must be page-aligned"
        );
        assert!(
            config.shared_size as usize <= ENTRY_COUNT * PAGE_SIZE as usize,
            "shared kernel region does not fit one table page"
        );

        let process = pools.get_mut(config.process_pool);
        let directory = process
            .get_frames(1)
            .expect("out of frames for a page directory");
        let shared_table = process
            .get_frames(1)
            .expect("out of frames for the shared kernel table");

        let window = config.window;
        // SAFETY: Both frames were just handed out by the process pool and
        // are reachable through the boot window; nothing else points at them.
        unsafe {
            let dir = window.frame_ptr(directory).cast::<RawTable>();
            (*dir).zero();
            (*dir).entries[0] = PageTableEntry::new(
                shared_table,
                PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
            );
            (*dir).entries[SELF_MAP_SLOT] = PageTableEntry::new(
                directory,
                PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
            );

            let table = window.frame_ptr(shared_table).cast::<RawTable>();
            (*table).zero();
            for i in 0..(config.shared_size / PAGE_SIZE) as usize {
                (*table).entries[i] = PageTableEntry::new(
                    Frame::from_number(i as u32),
                    PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
                );
            }
        }

        kinfo!(
            "mm: built address space, directory at frame {}",
            directory.number()
        );
        Self {
            directory,
            config: *config,
            vm_windows: ArrayVec::new(),
        }
    }

    /// Makes this the active address space.
    ///
    /// Loads the directory into the translation root register; may be called
    /// any number of times to switch between address spaces.
    pub fn load(&self) {
        ACTIVE_ROOT.store(self.directory.number(), Ordering::Release);
        arch::load_root(self.directory.start_address());
        kdebug!(
            "mm: loaded address space with directory frame {}",
            self.directory.number()
        );
    }

    /// Whether this table is the one currently loaded.
    pub fn is_active(&self) -> bool {
        ACTIVE_ROOT.load(Ordering::Acquire) == self.directory.number()
    }

    /// Maps in the page containing `addr` in response to a page fault.
    ///
    /// If the directory slot for `addr` is empty, a table page is taken from
    /// the kernel pool, zeroed and installed first. The data page itself
    /// comes from the process pool and is mapped present, writable and
    /// user-accessible.
    ///
    /// # Panics
    ///
    /// Panics if `code` reports a protection violation rather than a missing
    /// translation, if the page is already mapped (the fault should not have
    /// happened), or if a pool runs dry.
    pub fn handle_fault(&mut self, addr: VirtAddr, code: PageFaultCode, pools: &mut PoolRegistry) {
        assert!(
            !code.contains(PageFaultCode::PROTECTION),
            "protection violation at {addr}, not a missing page"
        );

        let dir_index = addr.dir_index();
        let table_index = addr.table_index();
        kdebug!("mm: demand fault at {addr} (dir {dir_index}, table {table_index})");

        let view = self.view();
        // SAFETY: The directory and every installed table page are owned by
        // this address space and reachable through `view`; the indices are
        // in range by construction.
        unsafe {
            let dir = self.directory_ptr(view);
            let mut dir_entry = (*dir).entries[dir_index];
            if !dir_entry.is_present() {
                let table_frame = pools
                    .get_mut(self.config.kernel_pool)
                    .get_frames(1)
                    .expect("out of frames for a table page");
                // Install the slot before zeroing so the recursive window
                // can reach the fresh table page.
                (*dir).entries[dir_index] = PageTableEntry::new(
                    table_frame,
                    PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
                );
                (*self.table_ptr(view, dir_index, table_frame)).zero();
                dir_entry = (*dir).entries[dir_index];
            }

            let table = self.table_ptr(view, dir_index, dir_entry.frame());
            assert!(
                !(*table).entries[table_index].is_present(),
                "fault at {addr} but the page is already mapped"
            );
            let data_frame = pools
                .get_mut(self.config.process_pool)
                .get_frames(1)
                .expect("out of frames for a data page");
            (*table).entries[table_index] = PageTableEntry::new(
                data_frame,
                PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER,
            );
        }
    }

    /// Unmaps the given page and returns its frame to the owning pool.
    ///
    /// A page that was never faulted in is a benign no-op; freeing a region
    /// must not care which of its pages were actually touched. If this table
    /// is active, the root register is rewritten to flush the stale
    /// translation.
    ///
    /// # Panics
    ///
    /// Once translation is enabled, panics unless this table is the loaded
    /// one: its pages are then only reachable through the recursive window,
    /// which follows the active directory. The same holds for
    /// [`PageTable::handle_fault`] and [`PageTable::translate`].
    pub fn free_page(&mut self, page: Page, pools: &mut PoolRegistry) {
        let addr = page.start_address();
        let dir_index = addr.dir_index();
        let table_index = addr.table_index();

        let view = self.view();
        // SAFETY: Same reachability argument as in `handle_fault`.
        let freed = unsafe {
            let dir = self.directory_ptr(view);
            let dir_entry = (*dir).entries[dir_index];
            if !dir_entry.is_present() {
                return;
            }
            let table = self.table_ptr(view, dir_index, dir_entry.frame());
            let entry = (*table).entries[table_index];
            if !entry.is_present() {
                return;
            }
            (*table).entries[table_index] = PageTableEntry::empty();
            entry.frame()
        };
        pools.release_frames(freed);

        if self.is_active() {
            arch::load_root(self.directory.start_address());
        }
    }

    /// Translates a virtual address through this table.
    ///
    /// Returns `None` while the page has not been faulted in.
    pub fn translate(&self, addr: VirtAddr) -> Option<PhysAddr> {
        let view = self.view();
        // SAFETY: Read-only walk of structures owned by this address space.
        unsafe {
            let dir = self.directory_ptr(view);
            let dir_entry = (*dir).entries[addr.dir_index()];
            if !dir_entry.is_present() {
                return None;
            }
            let table = self.table_ptr(view, addr.dir_index(), dir_entry.frame());
            let entry = (*table).entries[addr.table_index()];
            if !entry.is_present() {
                return None;
            }
            Some(PhysAddr::new(
                entry.frame().start_address().as_u32() + addr.page_offset(),
            ))
        }
    }

    /// Records a virtual pool window in this address space.
    ///
    /// The registry only appends; windows live as long as the address space.
    ///
    /// # Panics
    ///
    /// Panics if the window registry is full.
    pub fn register_pool(&mut self, window: VirtRegion) {
        assert!(
            !self.vm_windows.is_full(),
            "virtual pool registry is full"
        );
        self.vm_windows.push(window);
    }

    /// The virtual pool windows registered so far.
    pub fn vm_windows(&self) -> &[VirtRegion] {
        self.vm_windows.as_slice()
    }

    /// The frame holding this table's page directory.
    pub fn directory_frame(&self) -> Frame {
        self.directory
    }

    fn view(&self) -> TableView {
        if paging_enabled() {
            // The recursive window only reaches the loaded directory;
            // walking it for any other table would touch the wrong
            // address space.
            assert!(self.is_active(), "recursive access to an inactive table");
            TableView::Recursive
        } else {
            TableView::Direct(self.config.window)
        }
    }

    fn directory_ptr(&self, view: TableView) -> *mut RawTable {
        match view {
            TableView::Direct(window) => window.frame_ptr(self.directory).cast(),
            TableView::Recursive => DIRECTORY_WINDOW as *mut RawTable,
        }
    }

    fn table_ptr(&self, view: TableView, dir_index: usize, frame: Frame) -> *mut RawTable {
        match view {
            TableView::Direct(window) => window.frame_ptr(frame).cast(),
            TableView::Recursive => {
                (TABLE_WINDOW_BASE + dir_index * PAGE_SIZE as usize) as *mut RawTable
            }
        }
    }
}

/// Switches address translation on.
///
/// One-way: once enabled, paging structures are only reachable through the
/// recursive self-map.
///
/// # Panics
///
/// Panics if no address space has been loaded, or if translation is already
/// enabled.
pub fn enable_paging() {
    assert!(
        ACTIVE_ROOT.load(Ordering::Acquire) != NO_ACTIVE_ROOT,
        "an address space must be loaded before enabling translation"
    );
    let was_enabled = PAGING_ENABLED.swap(true, Ordering::SeqCst);
    assert!(!was_enabled, "translation can only be enabled once");
    arch::enable_translation();
    kinfo!("mm: address translation enabled");
}

/// Whether address translation has been switched on.
pub fn paging_enabled() -> bool {
    PAGING_ENABLED.load(Ordering::Acquire)
}
