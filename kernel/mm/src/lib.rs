//! Memory management for the Muon kernel.
//!
//! Physical memory is carved into pools of contiguous 4 KiB frames managed by
//! [`ContigFramePool`], all registered in a [`PoolRegistry`]. On top of that
//! sits a two-level demand-paged [`PageTable`] (10/10/12 split, recursive
//! self-map in the last directory slot) and per-address-space [`VmPool`]s that
//! hand out virtual regions whose pages are only backed once they fault.
//!
//! Everything is host-testable: before translation is enabled the paging
//! structures are reached through a [`DirectMap`] window, which in tests is
//! simply a heap buffer standing in for physical memory.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod frame_pool;
pub mod global;
pub mod layout;
pub mod page_table;
pub mod pools;
pub mod pte;
pub mod state;
pub mod vm_pool;

pub use frame_pool::{ContigFramePool, InfoPlacement};
pub use layout::{DirectMap, PoolKind, VirtRegion};
pub use page_table::{PageTable, PagingConfig};
pub use pools::{PoolHandle, PoolRegistry};
pub use pte::{PageFaultCode, PageTableFlags};
pub use vm_pool::VmPool;

/// Maximum number of physical frame pools a [`PoolRegistry`] can hold.
pub const MAX_POOLS: usize = 8;

/// Maximum number of virtual pool windows per address space.
pub const MAX_VM_POOLS: usize = 8;

/// Maximum number of live regions in a single [`VmPool`].
pub const MAX_VM_REGIONS: usize = 32;

/// Maximum number of page tables the global memory core can track.
pub const MAX_TABLES: usize = 8;

#[cfg(test)]
pub(crate) mod testutil {
    //! A heap-backed stand-in for physical memory.

    use std::alloc::{self, Layout};

    use muon_core::paging::PAGE_SIZE;

    use crate::layout::DirectMap;

    /// A page-aligned arena covering the frames `[base_frame,
    /// base_frame + frame_count)`, reachable through [`PhysArena::window`].
    pub(crate) struct PhysArena {
        ptr: *mut u8,
        layout: Layout,
        base_frame: u32,
    }

    impl PhysArena {
        pub(crate) fn new(base_frame: u32, frame_count: u32) -> Self {
            let bytes = frame_count as usize * PAGE_SIZE as usize;
            let layout = Layout::from_size_align(bytes, PAGE_SIZE as usize).unwrap();
            // SAFETY: `layout` has a non-zero size.
            let ptr = unsafe { alloc::alloc_zeroed(layout) };
            assert!(!ptr.is_null(), "arena allocation failed");
            Self {
                ptr,
                layout,
                base_frame,
            }
        }

        /// A window under which the arena's frames carry their real numbers:
        /// frame `base_frame` resolves to the start of the buffer.
        pub(crate) fn window(&self) -> DirectMap {
            let offset = (self.ptr as usize)
                .wrapping_sub(self.base_frame as usize * PAGE_SIZE as usize);
            DirectMap::new(offset)
        }
    }

    impl Drop for PhysArena {
        fn drop(&mut self) {
            // SAFETY: `ptr` was allocated with `layout` in `new`.
            unsafe { alloc::dealloc(self.ptr, self.layout) };
        }
    }
}
