//! Hooks into the architecture layer.
//!
//! The paging code never touches control registers itself; the arch crate
//! registers functions here during early boot. Before registration every
//! hook is a harmless default, which is also what lets the whole crate run
//! in host tests.

use core::sync::atomic::{AtomicPtr, Ordering};

use muon_core::addr::{PhysAddr, VirtAddr};

/// Loads a page directory's physical address into the translation root
/// register (CR3 on x86).
pub type RootLoaderFn = fn(PhysAddr);

/// Flips the architecture's paging enable bit.
pub type PagingEnableFn = fn();

/// Reads the faulting address of the current page fault (CR2 on x86).
pub type FaultAddressFn = fn() -> u32;

fn null_root_loader(_root: PhysAddr) {}

fn null_paging_enable() {}

fn null_fault_address() -> u32 {
    0
}

static ROOT_LOADER: AtomicPtr<()> = AtomicPtr::new(null_root_loader as *mut ());
static PAGING_ENABLE: AtomicPtr<()> = AtomicPtr::new(null_paging_enable as *mut ());
static FAULT_ADDRESS: AtomicPtr<()> = AtomicPtr::new(null_fault_address as *mut ());

/// Registers the function that loads the translation root register.
pub fn register_root_loader(f: RootLoaderFn) {
    ROOT_LOADER.store(f as *mut (), Ordering::Release);
}

/// Registers the function that enables address translation.
pub fn register_paging_enable(f: PagingEnableFn) {
    PAGING_ENABLE.store(f as *mut (), Ordering::Release);
}

/// Registers the function that reads the faulting address.
pub fn register_fault_address_reader(f: FaultAddressFn) {
    FAULT_ADDRESS.store(f as *mut (), Ordering::Release);
}

/// Loads `root` into the translation root register.
///
/// Writing the root register also flushes the TLB, which is how unmapped
/// pages are invalidated.
pub fn load_root(root: PhysAddr) {
    let ptr = ROOT_LOADER.load(Ordering::Acquire);
    // SAFETY: Only valid `RootLoaderFn` pointers (or the initial default)
    // are ever stored into ROOT_LOADER.
    let f: RootLoaderFn = unsafe { core::mem::transmute(ptr) };
    f(root);
}

/// Turns on address translation.
pub fn enable_translation() {
    let ptr = PAGING_ENABLE.load(Ordering::Acquire);
    // SAFETY: Only valid `PagingEnableFn` pointers (or the initial default)
    // are ever stored into PAGING_ENABLE.
    let f: PagingEnableFn = unsafe { core::mem::transmute(ptr) };
    f();
}

/// Reads the address that caused the current page fault.
pub fn fault_address() -> VirtAddr {
    let ptr = FAULT_ADDRESS.load(Ordering::Acquire);
    // SAFETY: Only valid `FaultAddressFn` pointers (or the initial default)
    // are ever stored into FAULT_ADDRESS.
    let f: FaultAddressFn = unsafe { core::mem::transmute(ptr) };
    VirtAddr::new(f())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn defaults_are_harmless() {
        load_root(PhysAddr::new(0x40_0000));
        enable_translation();
    }

    #[test]
    fn registered_reader_is_dispatched() {
        static LAST: AtomicU32 = AtomicU32::new(0);
        fn reader() -> u32 {
            LAST.load(Ordering::Relaxed)
        }
        register_fault_address_reader(reader);
        LAST.store(0x40_1234, Ordering::Relaxed);
        assert_eq!(fault_address().as_u32(), 0x40_1234);
    }
}
