//! The one-way switch into translated mode.
//!
//! Enabling translation is process-global state, so everything lives in a
//! single test function in its own binary.

use std::alloc::{self, Layout};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use muon_core::addr::{PhysAddr, VirtAddr};
use muon_core::paging::{Frame, PAGE_SIZE, Page};
use muon_mm::arch;
use muon_mm::frame_pool::{ContigFramePool, InfoPlacement};
use muon_mm::layout::{DirectMap, PoolKind};
use muon_mm::page_table::{self, PageTable, PagingConfig};
use muon_mm::pools::PoolRegistry;
use muon_mm::pte::PageFaultCode;

const MIB: u32 = 1024 * 1024;

struct PhysArena {
    ptr: *mut u8,
    layout: Layout,
    base_frame: u32,
}

impl PhysArena {
    fn new(base_frame: u32, count: u32) -> Self {
        let layout =
            Layout::from_size_align(count as usize * PAGE_SIZE as usize, PAGE_SIZE as usize)
                .unwrap();
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        Self {
            ptr,
            layout,
            base_frame,
        }
    }

    fn window(&self) -> DirectMap {
        DirectMap::new(
            (self.ptr as usize).wrapping_sub(self.base_frame as usize * PAGE_SIZE as usize),
        )
    }
}

impl Drop for PhysArena {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr, self.layout) };
    }
}

/// Stand-ins for the root register and the paging enable bit.
static LOADED_ROOT: AtomicU32 = AtomicU32::new(0);
static TRANSLATION_ON: AtomicBool = AtomicBool::new(false);

fn load_root(root: PhysAddr) {
    LOADED_ROOT.store(root.as_u32(), Ordering::Relaxed);
}

fn enable_translation() {
    TRANSLATION_ON.store(true, Ordering::Relaxed);
}

#[test]
fn translation_enables_exactly_once() {
    let arena = PhysArena::new(512, 1536);
    let window = arena.window();
    arch::register_root_loader(load_root);
    arch::register_paging_enable(enable_translation);

    let (kernel, process) = unsafe {
        (
            ContigFramePool::new(
                Frame::from_number(512),
                512,
                InfoPlacement::SelfHosted,
                window,
                PoolKind::Kernel,
            ),
            ContigFramePool::new(
                Frame::from_number(1024),
                1024,
                InfoPlacement::SelfHosted,
                window,
                PoolKind::Process,
            ),
        )
    };
    let mut pools = PoolRegistry::new();
    let config = PagingConfig {
        kernel_pool: pools.register(kernel),
        process_pool: pools.register(process),
        shared_size: 4 * MIB,
        window,
    };

    // Enabling before any address space is loaded is refused.
    assert!(std::panic::catch_unwind(page_table::enable_paging).is_err());
    assert!(!page_table::paging_enabled());

    let table = PageTable::new(&config, &mut pools);
    // A second address space with one faulted-in page, left inactive.
    let mut other = PageTable::new(&config, &mut pools);
    let other_page = VirtAddr::new(16 * MIB);
    other.handle_fault(other_page, PageFaultCode::WRITE, &mut pools);

    table.load();
    assert!(table.is_active());
    assert_eq!(
        LOADED_ROOT.load(Ordering::Relaxed),
        table.directory_frame().start_address().as_u32()
    );

    page_table::enable_paging();
    assert!(page_table::paging_enabled());
    assert!(TRANSLATION_ON.load(Ordering::Relaxed));

    // The switch is one-way.
    assert!(std::panic::catch_unwind(page_table::enable_paging).is_err());
    assert!(page_table::paging_enabled());

    // Once translation is on, only the loaded address space is reachable:
    // the recursive window follows the active directory, so touching the
    // inactive table must refuse rather than walk the wrong tables.
    assert!(!other.is_active());
    let walk_inactive = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        other.free_page(Page::containing(other_page), &mut pools);
    }));
    assert!(walk_inactive.is_err());
    let translate_inactive =
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| other.translate(other_page)));
    assert!(translate_inactive.is_err());
}
