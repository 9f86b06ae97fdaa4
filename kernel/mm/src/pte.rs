//! Page table entries and the raw table page layout.

use bitflags::bitflags;
use muon_core::paging::{ENTRY_COUNT, Frame, PAGE_SHIFT};

bitflags! {
    /// Flag bits of a page directory or page table entry.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PageTableFlags: u32 {
        /// The entry holds a valid translation.
        const PRESENT = 1 << 0;
        /// The mapped page may be written.
        const WRITABLE = 1 << 1;
        /// The mapped page is reachable from user mode.
        const USER = 1 << 2;
    }
}

bitflags! {
    /// The error code delivered with a page fault.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PageFaultCode: u32 {
        /// Set for a protection violation, clear for a missing translation.
        const PROTECTION = 1 << 0;
        /// The faulting access was a write.
        const WRITE = 1 << 1;
        /// The fault happened in user mode.
        const USER = 1 << 2;
    }
}

/// Mask of the frame address bits in an entry.
const ADDR_MASK: u32 = 0xFFFF_F000;

/// A single 32-bit page directory or page table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageTableEntry(u32);

impl PageTableEntry {
    /// An entry with no translation and no flags.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// An entry pointing at `frame` with the given flags.
    pub const fn new(frame: Frame, flags: PageTableFlags) -> Self {
        Self((frame.number() << PAGE_SHIFT) | flags.bits())
    }

    /// Whether the entry holds a valid translation.
    pub const fn is_present(self) -> bool {
        self.0 & PageTableFlags::PRESENT.bits() != 0
    }

    /// The frame this entry points at. Meaningless unless present.
    pub const fn frame(self) -> Frame {
        Frame::from_number((self.0 & ADDR_MASK) >> PAGE_SHIFT)
    }

    /// The flag bits of the entry.
    pub const fn flags(self) -> PageTableFlags {
        PageTableFlags::from_bits_truncate(self.0)
    }
}

/// One page-sized table of [`ENTRY_COUNT`] entries, as the hardware walks it.
#[repr(C, align(4096))]
pub struct RawTable {
    /// The entries, indexed by directory or table index.
    pub entries: [PageTableEntry; ENTRY_COUNT],
}

impl RawTable {
    /// Clears every entry.
    pub fn zero(&mut self) {
        self.entries = [PageTableEntry::empty(); ENTRY_COUNT];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_packs_frame_and_flags() {
        let entry = PageTableEntry::new(
            Frame::from_number(0x413),
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
        );
        assert!(entry.is_present());
        assert_eq!(entry.frame().number(), 0x413);
        assert_eq!(
            entry.flags(),
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE
        );
    }

    #[test]
    fn empty_entry_is_not_present() {
        assert!(!PageTableEntry::empty().is_present());
    }

    #[test]
    fn fault_code_distinguishes_missing_from_protection() {
        let missing_write = PageFaultCode::WRITE | PageFaultCode::USER;
        assert!(!missing_write.contains(PageFaultCode::PROTECTION));
        let violation = PageFaultCode::PROTECTION | PageFaultCode::WRITE;
        assert!(violation.contains(PageFaultCode::PROTECTION));
    }

    #[test]
    fn raw_table_is_page_sized() {
        assert_eq!(core::mem::size_of::<RawTable>(), 4096);
        assert_eq!(core::mem::align_of::<RawTable>(), 4096);
    }
}
