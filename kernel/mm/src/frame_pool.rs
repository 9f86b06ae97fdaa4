//! Contiguous physical frame pools.
//!
//! A [`ContigFramePool`] manages one reserved slice of physical memory and
//! hands out runs of consecutive frames. Per-frame state lives in a packed
//! [`StateMap`] that is itself placed in physical frames, either carved out
//! of the pool's own range or supplied by the caller.

use muon_core::paging::{Frame, PAGE_SIZE};
use muon_core::{kdebug, ktrace};

use crate::layout::{DirectMap, PoolKind};
use crate::state::{FrameState, StateMap};

/// Where a pool's management frames live.
#[derive(Clone, Copy, Debug)]
pub enum InfoPlacement {
    /// Carve the management frames out of the start of the pool itself.
    SelfHosted,
    /// Use caller-supplied frames outside the pool's range.
    External {
        /// First management frame.
        frame: Frame,
        /// Number of frames supplied.
        count: u32,
    },
}

/// An allocator for runs of contiguous physical frames.
pub struct ContigFramePool {
    base: Frame,
    frames: u32,
    free: u32,
    states: StateMap,
    kind: PoolKind,
}

impl ContigFramePool {
    /// Creates a pool over the frames `[base, base + frames)`.
    ///
    /// All frames start out free; with [`InfoPlacement::SelfHosted`] the
    /// management frames at the start of the pool are immediately marked
    /// inaccessible.
    ///
    /// # Panics
    ///
    /// Panics if `frames` is zero or not a multiple of four, if the range
    /// does not fit the reserved window for `kind`, or if an external info
    /// placement is too small or overlaps the pool.
    ///
    /// # Safety
    ///
    /// The management frames must be real, exclusively owned memory that is
    /// reachable through `window` for the rest of the kernel's run. The pool
    /// range must not be managed by any other allocator.
    pub unsafe fn new(
        base: Frame,
        frames: u32,
        info: InfoPlacement,
        window: DirectMap,
        kind: PoolKind,
    ) -> Self {
        assert!(frames > 0, "a frame pool cannot be empty");
        assert!(
            frames % 4 == 0,
            "frame count {frames} is not a multiple of four"
        );
        assert!(
            kind.window().contains_range(base, frames),
            "pool [{}, {}) does not fit the {kind:?} window",
            base.number(),
            base.number() + frames
        );

        let needed = Self::needed_info_frames(frames);
        let (info_frame, self_hosted) = match info {
            InfoPlacement::SelfHosted => (base, true),
            InfoPlacement::External { frame, count } => {
                assert!(
                    count >= needed,
                    "{count} info frames supplied, {needed} needed"
                );
                let outside = frame.number() + count <= base.number()
                    || frame.number() >= base.number() + frames;
                assert!(outside, "external info frames overlap the pool");
                (frame, false)
            }
        };

        // SAFETY: The caller guarantees the info frames are valid, owned and
        // reachable through `window`; `needed * PAGE_SIZE` bytes cover the
        // `frames / 4` bytes the map occupies.
        let states = unsafe { StateMap::from_raw(window.frame_ptr(info_frame), frames as usize) };

        let mut pool = Self {
            base,
            frames,
            free: frames,
            states,
            kind,
        };
        if self_hosted {
            pool.mark_inaccessible(base, needed);
        }
        kdebug!(
            "mm: {kind:?} pool over frames [{}, {}), {} free",
            base.number(),
            base.number() + frames,
            pool.free
        );
        pool
    }

    /// The number of management frames a pool of `frames` frames needs.
    ///
    /// Four frames of state fit in a byte, so one management frame covers
    /// `4 * PAGE_SIZE` pool frames.
    pub const fn needed_info_frames(frames: u32) -> u32 {
        frames.div_ceil(4 * PAGE_SIZE)
    }

    /// Allocates `count` contiguous frames, returning the first.
    ///
    /// Scans for the lowest free run that fits. Returns `None` when no such
    /// run exists; a failed allocation changes nothing.
    pub fn get_frames(&mut self, count: u32) -> Option<Frame> {
        assert!(count > 0, "cannot allocate zero frames");
        if count > self.free {
            kdebug!(
                "mm: {:?} pool out of frames ({} requested, {} free)",
                self.kind,
                count,
                self.free
            );
            return None;
        }

        let mut run_start = 0usize;
        let mut run_len = 0u32;
        for index in 0..self.frames as usize {
            if self.states.get(index) == FrameState::Free {
                if run_len == 0 {
                    run_start = index;
                }
                run_len += 1;
                if run_len == count {
                    // Tail frames first so the head marker lands on a fully
                    // recorded run.
                    for tail in run_start + 1..run_start + count as usize {
                        self.states.set(tail, FrameState::Allocated);
                    }
                    self.states.set(run_start, FrameState::Head);
                    self.free -= count;
                    let first = Frame::from_number(self.base.number() + run_start as u32);
                    ktrace!(
                        "mm: {:?} pool handed out [{}, {})",
                        self.kind,
                        first.number(),
                        first.number() + count
                    );
                    return Some(first);
                }
            } else {
                run_len = 0;
            }
        }

        kdebug!(
            "mm: {:?} pool too fragmented for a run of {}",
            self.kind,
            count
        );
        None
    }

    /// Permanently removes `[first, first + count)` from circulation.
    ///
    /// Used for the pool's own management frames and for device or firmware
    /// ranges that must never be handed out. The frames are recorded as an
    /// allocated run headed at `first`.
    ///
    /// # Panics
    ///
    /// Panics if the range is empty or not entirely inside the pool.
    pub fn mark_inaccessible(&mut self, first: Frame, count: u32) {
        assert!(count > 0, "cannot mark an empty range inaccessible");
        assert!(
            self.contains(first),
            "inaccessible range starts outside the pool"
        );
        let start = (first.number() - self.base.number()) as usize;
        assert!(
            start + count as usize <= self.frames as usize,
            "inaccessible range runs past the end of the pool"
        );
        for index in start + 1..start + count as usize {
            if self.states.get(index) == FrameState::Free {
                self.free -= 1;
            }
            self.states.set(index, FrameState::Allocated);
        }
        if self.states.get(start) == FrameState::Free {
            self.free -= 1;
        }
        self.states.set(start, FrameState::Head);
    }

    /// Releases the run headed at `first`, returning the number of frames
    /// freed.
    ///
    /// The run extends from the head frame to the frame before the next head,
    /// free frame or pool end.
    ///
    /// # Panics
    ///
    /// Panics if `first` is outside the pool or is not the head of an
    /// allocated run (releasing twice, or releasing an interior frame).
    pub fn release(&mut self, first: Frame) -> u32 {
        assert!(
            self.contains(first),
            "frame {} is not in this pool",
            first.number()
        );
        let start = (first.number() - self.base.number()) as usize;
        assert!(
            self.states.get(start) == FrameState::Head,
            "frame {} is not the head of an allocated run (double free?)",
            first.number()
        );

        let mut index = start + 1;
        while index < self.frames as usize && self.states.get(index) == FrameState::Allocated {
            self.states.set(index, FrameState::Free);
            index += 1;
        }
        self.states.set(start, FrameState::Free);

        let freed = (index - start) as u32;
        self.free += freed;
        ktrace!(
            "mm: {:?} pool took back [{}, {})",
            self.kind,
            first.number(),
            first.number() + freed
        );
        freed
    }

    /// Whether `frame` lies inside the pool's range.
    pub const fn contains(&self, frame: Frame) -> bool {
        frame.number() >= self.base.number() && frame.number() < self.base.number() + self.frames
    }

    /// Whether `[base, base + frames)` shares any frame with the pool.
    pub const fn overlaps_range(&self, base: Frame, frames: u32) -> bool {
        base.number() < self.base.number() + self.frames
            && self.base.number() < base.number() + frames
    }

    /// The first frame of the pool.
    pub const fn base_frame(&self) -> Frame {
        self.base
    }

    /// The total number of frames managed by the pool.
    pub const fn frame_count(&self) -> u32 {
        self.frames
    }

    /// The number of frames currently free.
    pub const fn free_frames(&self) -> u32 {
        self.free
    }

    /// Which reserved window this pool lives in.
    pub const fn kind(&self) -> PoolKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::PhysArena;

    /// A fully free 512-frame kernel pool with its state map parked in an
    /// external frame below the pool window.
    fn external_pool(arena: &PhysArena) -> ContigFramePool {
        // SAFETY: Frame 0 is backed by the arena and owned by this pool.
        unsafe {
            ContigFramePool::new(
                Frame::from_number(512),
                512,
                InfoPlacement::External {
                    frame: Frame::from_number(0),
                    count: 1,
                },
                arena.window(),
                PoolKind::Kernel,
            )
        }
    }

    #[test]
    fn info_frame_sizing() {
        assert_eq!(ContigFramePool::needed_info_frames(4), 1);
        assert_eq!(ContigFramePool::needed_info_frames(512), 1);
        assert_eq!(ContigFramePool::needed_info_frames(4 * PAGE_SIZE), 1);
        assert_eq!(ContigFramePool::needed_info_frames(4 * PAGE_SIZE + 4), 2);
    }

    #[test]
    fn self_hosted_pool_reserves_its_map() {
        let arena = PhysArena::new(512, 1);
        // SAFETY: Frame 512 is backed by the arena.
        let pool = unsafe {
            ContigFramePool::new(
                Frame::from_number(512),
                512,
                InfoPlacement::SelfHosted,
                arena.window(),
                PoolKind::Kernel,
            )
        };
        assert_eq!(pool.free_frames(), 511);
        assert_eq!(pool.frame_count(), 512);
    }

    #[test]
    fn allocate_and_release_restores_free_count() {
        let arena = PhysArena::new(0, 1);
        let mut pool = external_pool(&arena);
        assert_eq!(pool.free_frames(), 512);

        let run = pool.get_frames(3).unwrap();
        assert_eq!(run.number(), 512);
        assert_eq!(pool.free_frames(), 509);

        assert_eq!(pool.release(run), 3);
        assert_eq!(pool.free_frames(), 512);
    }

    #[test]
    fn first_fit_reuses_the_lowest_gap() {
        let arena = PhysArena::new(0, 1);
        let mut pool = external_pool(&arena);

        let a = pool.get_frames(4).unwrap();
        let b = pool.get_frames(4).unwrap();
        let _c = pool.get_frames(4).unwrap();
        assert_eq!(b.number(), a.number() + 4);

        pool.release(b);
        // A two-frame request fits in the gap b left behind.
        assert_eq!(pool.get_frames(2).unwrap(), b);
        // A wider request has to skip past c.
        assert_eq!(pool.get_frames(4).unwrap().number(), a.number() + 12);
    }

    #[test]
    fn adjacent_runs_release_independently() {
        let arena = PhysArena::new(0, 1);
        let mut pool = external_pool(&arena);

        let a = pool.get_frames(2).unwrap();
        let b = pool.get_frames(2).unwrap();
        // Releasing a stops at b's head marker.
        assert_eq!(pool.release(a), 2);
        assert_eq!(pool.free_frames(), 510);
        assert_eq!(pool.release(b), 2);
        assert_eq!(pool.free_frames(), 512);
    }

    #[test]
    fn exhaustion_returns_none_and_changes_nothing() {
        let arena = PhysArena::new(0, 1);
        let mut pool = external_pool(&arena);
        assert!(pool.get_frames(513).is_none());
        assert_eq!(pool.free_frames(), 512);
        // Fragment the pool, then ask for a run larger than any hole.
        let runs: Vec<_> = (0..4).map(|_| pool.get_frames(100).unwrap()).collect();
        pool.release(runs[1]);
        pool.release(runs[3]);
        assert!(pool.get_frames(150).is_none());
        assert_eq!(pool.free_frames(), 312);
    }

    #[test]
    fn mark_inaccessible_counts_only_free_frames() {
        let arena = PhysArena::new(0, 1);
        let mut pool = external_pool(&arena);
        pool.mark_inaccessible(Frame::from_number(600), 8);
        assert_eq!(pool.free_frames(), 504);
        // The inaccessible run behaves like any allocated run on release.
        assert_eq!(pool.release(Frame::from_number(600)), 8);
        assert_eq!(pool.free_frames(), 512);
    }

    #[test]
    #[should_panic(expected = "empty range")]
    fn mark_inaccessible_rejects_an_empty_range() {
        let arena = PhysArena::new(0, 1);
        let mut pool = external_pool(&arena);
        pool.mark_inaccessible(Frame::from_number(600), 0);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_release_panics() {
        let arena = PhysArena::new(0, 1);
        let mut pool = external_pool(&arena);
        let run = pool.get_frames(4).unwrap();
        pool.release(run);
        pool.release(run);
    }

    #[test]
    #[should_panic(expected = "not the head")]
    fn releasing_an_interior_frame_panics() {
        let arena = PhysArena::new(0, 1);
        let mut pool = external_pool(&arena);
        let run = pool.get_frames(4).unwrap();
        pool.release(Frame::from_number(run.number() + 1));
    }

    #[test]
    #[should_panic(expected = "multiple of four")]
    fn frame_count_must_be_a_multiple_of_four() {
        let arena = PhysArena::new(512, 1);
        // SAFETY: Frame 512 is backed by the arena.
        let _ = unsafe {
            ContigFramePool::new(
                Frame::from_number(512),
                510,
                InfoPlacement::SelfHosted,
                arena.window(),
                PoolKind::Kernel,
            )
        };
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn pool_must_fit_its_window() {
        let arena = PhysArena::new(512, 1);
        // SAFETY: Frame 512 is backed by the arena.
        let _ = unsafe {
            ContigFramePool::new(
                Frame::from_number(512),
                1024,
                InfoPlacement::SelfHosted,
                arena.window(),
                PoolKind::Kernel,
            )
        };
    }
}
