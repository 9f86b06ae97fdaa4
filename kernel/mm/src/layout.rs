//! Physical memory layout: the direct-map window, pool placement windows and
//! region arithmetic shared by the rest of the crate.

use muon_core::addr::VirtAddr;
use muon_core::paging::{Frame, PAGE_SIZE, PAGE_SHIFT};

/// A window through which physical frames can be read and written before
/// address translation is enabled.
///
/// On hardware this is the identity mapping the machine boots under, so the
/// offset is zero. Host tests substitute a heap buffer and an offset that
/// places it at the frame numbers under test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectMap {
    offset: usize,
}

impl DirectMap {
    /// A window with the given byte offset added to every physical address.
    pub const fn new(offset: usize) -> Self {
        Self { offset }
    }

    /// The identity window: physical addresses used as-is.
    pub const fn identity() -> Self {
        Self { offset: 0 }
    }

    /// Returns a pointer to the first byte of `frame`.
    pub fn frame_ptr(self, frame: Frame) -> *mut u8 {
        self.offset
            .wrapping_add((frame.number() as usize) << PAGE_SHIFT) as *mut u8
    }
}

/// A contiguous range of physical frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhysRegion {
    base: Frame,
    frames: u32,
}

impl PhysRegion {
    /// A region of `frames` frames starting at `base`.
    pub const fn new(base: Frame, frames: u32) -> Self {
        Self { base, frames }
    }

    /// The first frame of the region.
    pub const fn base(self) -> Frame {
        self.base
    }

    /// The number of frames in the region.
    pub const fn frames(self) -> u32 {
        self.frames
    }

    /// One past the last frame number.
    pub const fn end_number(self) -> u32 {
        self.base.number() + self.frames
    }

    /// Whether `[base, base + frames)` lies entirely inside this region.
    pub const fn contains_range(self, base: Frame, frames: u32) -> bool {
        base.number() >= self.base.number() && base.number() + frames <= self.end_number()
    }

    /// Whether `frame` lies inside this region.
    pub const fn contains(self, frame: Frame) -> bool {
        self.contains_range(frame, 1)
    }
}

/// Which reserved slice of physical memory a frame pool manages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolKind {
    /// The kernel pool, feeding page-table pages. Lives in `[2 MiB, 4 MiB)`.
    Kernel,
    /// The process pool, feeding directories and data pages. Lives in
    /// `[4 MiB, 32 MiB)`.
    Process,
}

impl PoolKind {
    /// The physical window a pool of this kind must fit inside.
    pub const fn window(self) -> PhysRegion {
        const MIB: u32 = 1024 * 1024;
        match self {
            Self::Kernel => PhysRegion::new(Frame::from_number(2 * MIB / PAGE_SIZE), 2 * MIB / PAGE_SIZE),
            Self::Process => PhysRegion::new(Frame::from_number(4 * MIB / PAGE_SIZE), 28 * MIB / PAGE_SIZE),
        }
    }
}

/// A contiguous range of virtual addresses, `[base, base + size)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VirtRegion {
    base: VirtAddr,
    size: u32,
}

impl VirtRegion {
    /// A region of `size` bytes starting at `base`.
    ///
    /// # Panics
    ///
    /// Panics if the region would wrap past the top of the address space.
    pub fn new(base: VirtAddr, size: u32) -> Self {
        assert!(
            base.as_u32().checked_add(size).is_some(),
            "virtual region {:#x}+{:#x} wraps the address space",
            base.as_u32(),
            size
        );
        Self { base, size }
    }

    /// The first address of the region.
    pub const fn base(self) -> VirtAddr {
        self.base
    }

    /// The size of the region in bytes.
    pub const fn size(self) -> u32 {
        self.size
    }

    /// One past the last address of the region.
    pub const fn end(self) -> u32 {
        self.base.as_u32() + self.size
    }

    /// Whether `addr` lies inside this region.
    pub const fn contains(self, addr: VirtAddr) -> bool {
        addr.as_u32() >= self.base.as_u32() && addr.as_u32() < self.end()
    }

    /// Whether this region and `other` share any address.
    pub const fn overlaps(self, other: VirtRegion) -> bool {
        self.base.as_u32() < other.end() && other.base.as_u32() < self.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_bounds() {
        let kernel = PoolKind::Kernel.window();
        assert_eq!(kernel.base().number(), 512);
        assert_eq!(kernel.end_number(), 1024);

        let process = PoolKind::Process.window();
        assert_eq!(process.base().number(), 1024);
        assert_eq!(process.end_number(), 8192);
    }

    #[test]
    fn phys_region_containment() {
        let region = PhysRegion::new(Frame::from_number(512), 512);
        assert!(region.contains_range(Frame::from_number(512), 512));
        assert!(region.contains_range(Frame::from_number(600), 100));
        assert!(!region.contains_range(Frame::from_number(1000), 100));
        assert!(!region.contains(Frame::from_number(1024)));
    }

    #[test]
    fn direct_map_offsets_frames() {
        let window = DirectMap::new(0x1000_0000);
        let ptr = window.frame_ptr(Frame::from_number(3));
        assert_eq!(ptr as usize, 0x1000_0000 + 3 * PAGE_SIZE as usize);

        let identity = DirectMap::identity();
        assert_eq!(identity.frame_ptr(Frame::from_number(512)) as usize, 512 * PAGE_SIZE as usize);
    }

    #[test]
    fn virt_region_overlap() {
        let a = VirtRegion::new(VirtAddr::new(0x40_0000), 0x40_0000);
        let b = VirtRegion::new(VirtAddr::new(0x60_0000), 0x40_0000);
        let c = VirtRegion::new(VirtAddr::new(0x80_0000), 0x40_0000);
        assert!(a.overlaps(b));
        assert!(b.overlaps(a));
        assert!(!a.overlaps(c));
        assert!(a.contains(VirtAddr::new(0x7F_FFFF)));
        assert!(!a.contains(VirtAddr::new(0x80_0000)));
    }

    #[test]
    #[should_panic(expected = "wraps the address space")]
    fn virt_region_rejects_wraparound() {
        let _ = VirtRegion::new(VirtAddr::new(0xFFFF_F000), 0x2000);
    }
}
