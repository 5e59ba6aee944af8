//! # Host-Visible Physical Memory Errors
//!
//! These surface to the embedder (`Machine`), never to the guest. Guest-
//! visible faults are reported by `rvcore-mmu`/`rvcore-hart` as
//! [`rvcore_hal::trap::TrapCause`] values instead.

use thiserror::Error;

/// Errors raised while attaching or dispatching against the physical
/// address space.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhysMemError {
    /// A new region would overlap guest RAM.
    #[error("MMIO region [{base:#x}, {end:#x}) overlaps guest RAM [{ram_base:#x}, {ram_end:#x})")]
    OverlapsRam {
        base: u64,
        end: u64,
        ram_base: u64,
        ram_end: u64,
    },

    /// A new region would overlap an already-attached region.
    #[error("MMIO region [{base:#x}, {end:#x}) overlaps existing region [{other_base:#x}, {other_end:#x})")]
    OverlapsRegion {
        base: u64,
        end: u64,
        other_base: u64,
        other_end: u64,
    },

    /// No free aligned slot could be found at or after the requested hint.
    #[error("no free MMIO slot of size {size:#x} found at or after hint {hint:#x}")]
    OutOfAddressSpace { hint: u64, size: u64 },

    /// A physical address did not land in RAM or any registered region.
    #[error("physical access fault at {addr:#x} (size {size})")]
    AccessFault { addr: u64, size: usize },

    /// A device handler reported failure for a dispatched access.
    #[error("MMIO handler rejected access at {addr:#x} (size {size})")]
    HandlerRejected { addr: u64, size: usize },
}
