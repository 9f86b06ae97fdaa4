//! The global memory core.
//!
//! Boot hands ownership of the pool registry and the paging configuration
//! to a process-wide singleton so that interrupt-context code (the page
//! fault entry point) can reach them without threading references through
//! the call chain.

use muon_core::sync::SpinLock;
use planck_noalloc::vec::ArrayVec;

use crate::MAX_TABLES;
use crate::arch;
use crate::page_table::{PageTable, PagingConfig};
use crate::pools::PoolRegistry;
use crate::pte::PageFaultCode;

/// A handle to a page table owned by the [`MemoryCore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableId(usize);

/// Everything the memory subsystem owns after initialization.
pub struct MemoryCore {
    /// The physical frame pools.
    pub pools: PoolRegistry,
    tables: ArrayVec<PageTable, MAX_TABLES>,
    config: PagingConfig,
}

static CORE: SpinLock<Option<MemoryCore>> = SpinLock::new(None);

/// Hands the pool registry and paging configuration to the global core.
///
/// # Panics
///
/// Panics if the core has already been initialized.
pub fn init(pools: PoolRegistry, config: PagingConfig) {
    let mut core = CORE.lock();
    assert!(core.is_none(), "memory core already initialized");
    *core = Some(MemoryCore {
        pools,
        tables: ArrayVec::new(),
        config,
    });
}

/// Runs `f` with exclusive access to the memory core.
///
/// # Panics
///
/// Panics if [`init`] has not been called.
pub fn with<R>(f: impl FnOnce(&mut MemoryCore) -> R) -> R {
    let mut core = CORE.lock();
    f(core.as_mut().expect("memory core not initialized"))
}

impl MemoryCore {
    /// Builds a new address space and keeps it in the core.
    ///
    /// # Panics
    ///
    /// Panics if the table slots are exhausted.
    pub fn create_table(&mut self) -> TableId {
        assert!(!self.tables.is_full(), "page table slots exhausted");
        let table = PageTable::new(&self.config, &mut self.pools);
        self.tables.push(table);
        TableId(self.tables.len() - 1)
    }

    /// The table behind `id`.
    pub fn table(&self, id: TableId) -> &PageTable {
        &self.tables[id.0]
    }

    /// The table behind `id`, mutably.
    pub fn table_mut(&mut self, id: TableId) -> &mut PageTable {
        &mut self.tables[id.0]
    }

    /// Makes the table behind `id` the active address space.
    pub fn load(&mut self, id: TableId) {
        self.tables[id.0].load();
    }

    /// Borrows a table and the pool registry together.
    ///
    /// Operations like releasing a virtual region walk a table while
    /// returning frames, so they need both halves at once.
    pub fn table_and_pools(&mut self, id: TableId) -> (&mut PageTable, &mut PoolRegistry) {
        let MemoryCore { pools, tables, .. } = self;
        (&mut tables[id.0], pools)
    }

    /// Routes a page fault at `addr` to the active address space.
    ///
    /// # Panics
    ///
    /// Panics if no table has been loaded.
    pub fn handle_active_fault(&mut self, addr: muon_core::addr::VirtAddr, code: PageFaultCode) {
        let MemoryCore { pools, tables, .. } = self;
        let table = tables
            .iter_mut()
            .find(|table| table.is_active())
            .expect("page fault with no active address space");
        table.handle_fault(addr, code, pools);
    }
}

/// The page fault entry point.
///
/// Called from the fault stub with the hardware error code; reads the
/// faulting address through the registered arch hook and maps the page in.
pub fn page_fault_entry(code: PageFaultCode) {
    let addr = arch::fault_address();
    with(|core| core.handle_active_fault(addr, code));
}
