//! The registry of physical frame pools.
//!
//! Frees arrive as a bare frame number with no pool attached, so the
//! registry keeps every pool and resolves a frame back to its owner by
//! range containment.

use muon_core::kinfo;
use muon_core::paging::Frame;
use planck_noalloc::vec::ArrayVec;

use crate::MAX_POOLS;
use crate::frame_pool::ContigFramePool;

/// A stable handle to a pool registered in a [`PoolRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolHandle(usize);

/// Owns every [`ContigFramePool`] in the system.
pub struct PoolRegistry {
    pools: ArrayVec<ContigFramePool, MAX_POOLS>,
}

impl PoolRegistry {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        Self {
            pools: ArrayVec::new(),
        }
    }

    /// Registers a pool and returns its handle.
    ///
    /// # Panics
    ///
    /// Panics if the registry is full or the pool's physical range overlaps
    /// an already registered pool.
    pub fn register(&mut self, pool: ContigFramePool) -> PoolHandle {
        assert!(!self.pools.is_full(), "frame pool registry is full");
        for existing in self.pools.iter() {
            assert!(
                !existing.overlaps_range(pool.base_frame(), pool.frame_count()),
                "pool at frame {} overlaps a registered pool",
                pool.base_frame().number()
            );
        }
        kinfo!(
            "mm: registered {:?} pool, frames [{}, {})",
            pool.kind(),
            pool.base_frame().number(),
            pool.base_frame().number() + pool.frame_count()
        );
        self.pools.push(pool);
        PoolHandle(self.pools.len() - 1)
    }

    /// Returns the pool behind `handle`.
    pub fn get(&self, handle: PoolHandle) -> &ContigFramePool {
        &self.pools[handle.0]
    }

    /// Returns the pool behind `handle`, mutably.
    pub fn get_mut(&mut self, handle: PoolHandle) -> &mut ContigFramePool {
        &mut self.pools[handle.0]
    }

    /// Finds the pool whose range contains `frame`.
    pub fn owner_of(&self, frame: Frame) -> Option<PoolHandle> {
        self.pools
            .iter()
            .position(|pool| pool.contains(frame))
            .map(PoolHandle)
    }

    /// Releases the run headed at `first` back to whichever pool owns it.
    ///
    /// Returns the number of frames freed.
    ///
    /// # Panics
    ///
    /// Panics if no registered pool contains `first`, or if `first` is not
    /// the head of an allocated run.
    pub fn release_frames(&mut self, first: Frame) -> u32 {
        let handle = self.owner_of(first).unwrap_or_else(|| {
            panic!(
                "frame {} does not belong to any registered pool",
                first.number()
            )
        });
        self.get_mut(handle).release(first)
    }

    /// The number of registered pools.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether no pool has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
