//! Packed per-frame allocation state.
//!
//! Each frame gets two bits: an availability bit (set while the frame is
//! free) and a head bit (set on the first frame of an allocated run). Four
//! frames share a byte, so the map for a pool of `n` frames occupies `n / 4`
//! bytes of management memory.

/// The allocation state of a single frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    /// The frame is available for allocation.
    Free,
    /// The frame is part of an allocated run (or permanently inaccessible).
    Allocated,
    /// The frame is the first frame of an allocated run.
    Head,
}

const AVAIL_BIT: u8 = 0b01;
const HEAD_BIT: u8 = 0b10;

/// All four frames of a byte free.
const ALL_FREE: u8 = 0x55;

/// A packed map of [`FrameState`]s living in frames set aside for management.
pub struct StateMap {
    bits: &'static mut [u8],
    frames: usize,
}

impl StateMap {
    /// Creates a map for `frames` frames at `ptr`, marking every frame free.
    ///
    /// # Safety
    ///
    /// `ptr` must point to at least `frames / 4` bytes (rounded up) of memory
    /// that is valid, exclusively owned by the map, and lives for the rest of
    /// the kernel's run.
    pub unsafe fn from_raw(ptr: *mut u8, frames: usize) -> Self {
        let bytes = frames.div_ceil(4);
        // SAFETY: The caller guarantees `ptr` covers `bytes` exclusive bytes.
        let bits = unsafe { core::slice::from_raw_parts_mut(ptr, bytes) };
        bits.fill(ALL_FREE);
        Self { bits, frames }
    }

    /// The number of frames tracked by the map.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Returns the state of frame `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or the stored bits are corrupt.
    pub fn get(&self, index: usize) -> FrameState {
        assert!(index < self.frames, "frame index {index} out of range");
        let shift = (index % 4) * 2;
        match (self.bits[index / 4] >> shift) & 0b11 {
            AVAIL_BIT => FrameState::Free,
            0 => FrameState::Allocated,
            HEAD_BIT => FrameState::Head,
            bits => panic!("corrupt state bits {bits:#b} for frame {index}"),
        }
    }

    /// Sets the state of frame `index`.
    pub fn set(&mut self, index: usize, state: FrameState) {
        assert!(index < self.frames, "frame index {index} out of range");
        let bits = match state {
            FrameState::Free => AVAIL_BIT,
            FrameState::Allocated => 0,
            FrameState::Head => HEAD_BIT,
        };
        let shift = (index % 4) * 2;
        let byte = &mut self.bits[index / 4];
        *byte = (*byte & !(0b11 << shift)) | (bits << shift);
    }
}
