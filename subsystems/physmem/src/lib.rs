//! # rvcore-physmem
//!
//! Guest physical address space: a single [`ram::PhysMem`] region plus an
//! ordered [`mmio::MmioBus`] of interval-registered device regions. This
//! crate owns the "where does a physical access go" decision; it knows
//! nothing about virtual memory (that is `rvcore-mmu`) or hart state.

pub mod error;
pub mod mmio;
pub mod ram;

pub use error::PhysMemError;
pub use mmio::{MmioBus, MmioHandler, MmioRegionInfo};
pub use ram::PhysMem;

/// Default guest RAM base address.
pub const DEFAULT_MEM_BASE: u64 = 0x8000_0000;

/// Alignment granularity the bus quantizes MMIO region sizes to and
/// auto-allocates slots on.
pub const MMIO_ALIGNMENT: u64 = 0x1000;

/// The kind of physical access being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}
