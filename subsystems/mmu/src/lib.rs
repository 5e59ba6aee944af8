//! # rvcore-mmu
//!
//! SV32 virtual memory: page-table walker, per-hart software TLB, and the
//! physical-dispatch step that routes a translated address to RAM or to an
//! `rvcore-physmem` MMIO region. Faults are reported as
//! [`rvcore_hal::trap::TrapCause`] values, never as a `Result` error type of
//! their own, so the hart can feed them straight into trap entry.

pub mod mmu;
pub mod pte;
pub mod satp;
pub mod tlb;

pub use mmu::{MemAccess, Mmu};
pub use pte::{Pte, PteFlags};
pub use satp::{Satp, SatpMode};
pub use tlb::{AccessBits, Tlb};
