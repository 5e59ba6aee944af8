//! # Host-visible machine errors
//!
//! Composes the subsystem error types into a flat enum, each subsystem's
//! own error type folded in by `#[from]` rather than re-stated as a string.
//! Guest-visible faults never appear here — they are
//! [`rvcore_hal::trap::TrapCause`] values handled inside the hart loop.

use rvcore_physmem::PhysMemError;
use thiserror::Error;

use crate::lifecycle::LifecycleStage;

/// Errors a [`crate::Machine`] surfaces to its embedder.
#[derive(Debug, Error)]
pub enum MachineError {
    /// A lifecycle method was called in a stage that does not permit it.
    #[error("cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        from: LifecycleStage,
        to: LifecycleStage,
    },

    /// A hart index passed to a per-hart accessor was out of range.
    #[error("hart index {0} out of range")]
    HartOutOfRange(usize),

    /// The PLIC's IRQ source table is exhausted.
    #[error("PLIC source table exhausted")]
    IrqExhausted,

    /// RAM or MMIO-bus attach/access failure.
    #[error(transparent)]
    Physmem(#[from] PhysMemError),
}
