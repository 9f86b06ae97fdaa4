//! Core library for the Muon teaching kernel: typed addresses, page and
//! frame numbers, spin-based locking, and the kernel logging facade.

#![cfg_attr(not(test), no_std)]

pub mod addr;
pub mod log;
pub mod paging;
pub mod sync;
