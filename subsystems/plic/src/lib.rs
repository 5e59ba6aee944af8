//! # rvcore-plic
//!
//! Platform-Level Interrupt Controller: per-source priority/pending/raised
//! state, per-context enable bitmaps and threshold, and the claim/complete
//! protocol that hands the highest-priority eligible IRQ to a hart.
//! [`plic::Plic`] is the lock-free state machine; [`mmio`] adapts it onto
//! the guest-visible MMIO register layout.

pub mod mmio;
pub mod plic;

pub use mmio::{PlicMmio, PLIC_MMIO_SIZE};
pub use plic::{ContextId, Plic};
