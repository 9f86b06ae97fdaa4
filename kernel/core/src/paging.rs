//! Page and frame number abstractions.
//!
//! Provides [`Frame`] and [`Page`] newtypes that carry a physical-frame or
//! virtual-page *number* (address divided by the page size). A frame is never
//! materialized as an object; its number and the allocator's per-frame state
//! are all there is to it.

use core::fmt;
use core::iter::FusedIterator;

use crate::addr::{PhysAddr, VirtAddr};

/// Size of a page (and of a physical frame) in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// log2 of [`PAGE_SIZE`]; the shift between an address and its page number.
pub const PAGE_SHIFT: u32 = 12;

/// Number of entries in a page directory or page table page.
pub const ENTRY_COUNT: usize = 1024;

/// A physical memory frame, identified by its frame number.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Frame(u32);

impl Frame {
    /// Creates a frame from its number.
    #[inline]
    pub const fn from_number(number: u32) -> Self {
        Self(number)
    }

    /// Returns the frame that contains the given physical address.
    #[inline]
    pub const fn containing(addr: PhysAddr) -> Self {
        Self(addr.as_u32() >> PAGE_SHIFT)
    }

    /// Returns the frame number.
    #[inline]
    pub const fn number(self) -> u32 {
        self.0
    }

    /// Returns the first physical address of this frame.
    #[inline]
    pub const fn start_address(self) -> PhysAddr {
        PhysAddr::new(self.0 << PAGE_SHIFT)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.0)
    }
}

/// A virtual memory page, identified by its page number.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Page(u32);

impl Page {
    /// Creates a page from its number.
    #[inline]
    pub const fn from_number(number: u32) -> Self {
        Self(number)
    }

    /// Returns the page that contains the given virtual address.
    #[inline]
    pub const fn containing(addr: VirtAddr) -> Self {
        Self(addr.as_u32() >> PAGE_SHIFT)
    }

    /// Returns the page number.
    #[inline]
    pub const fn number(self) -> u32 {
        self.0
    }

    /// Returns the first virtual address of this page.
    #[inline]
    pub const fn start_address(self) -> VirtAddr {
        VirtAddr::new(self.0 << PAGE_SHIFT)
    }

    /// Creates an iterator over the pages `[start, end)`.
    #[inline]
    pub fn range(start: Page, end: Page) -> PageRange {
        PageRange { start, end }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({})", self.0)
    }
}

/// An iterator over a half-open range of [`Page`]s.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    start: Page,
    end: Page,
}

impl Iterator for PageRange {
    type Item = Page;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.start.0 < self.end.0 {
            let page = self.start;
            self.start = Page(self.start.0 + 1);
            Some(page)
        } else {
            None
        }
    }
}

impl FusedIterator for PageRange {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_containing_address() {
        let frame = Frame::containing(PhysAddr::new(0x5678));
        assert_eq!(frame.number(), 5);
        assert_eq!(frame.start_address().as_u32(), 0x5000);
    }

    #[test]
    fn page_containing_address() {
        let page = Page::containing(VirtAddr::new(0x40_1234));
        assert_eq!(page.number(), 0x401);
        assert_eq!(page.start_address().as_u32(), 0x40_1000);
    }

    #[test]
    fn page_number_matches_translation_indices() {
        // The page number is address >> PAGE_SHIFT; the high ten of those
        // bits are the directory index, the low ten the table index.
        let addr = VirtAddr::new((5 << 22) | (9 << 12));
        let page = Page::containing(addr);
        assert_eq!(page.number() as usize >> 10, addr.dir_index());
        assert_eq!(page.number() as usize & 0x3FF, addr.table_index());
    }

    #[test]
    fn page_range_iterator() {
        let start = Page::containing(VirtAddr::new(0x1000));
        let end = Page::containing(VirtAddr::new(0x4000));
        let pages: Vec<_> = Page::range(start, end).collect();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].start_address().as_u32(), 0x1000);
        assert_eq!(pages[2].start_address().as_u32(), 0x3000);
    }

    #[test]
    fn empty_range() {
        let page = Page::containing(VirtAddr::new(0x1000));
        assert!(Page::range(page, page).next().is_none());
    }
}
