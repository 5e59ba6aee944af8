//! # rvcore-hal
//!
//! Leaf hardware-abstraction layer for the rvcore RISC-V emulator core.
//!
//! This crate has no dependency on any other `rvcore-*` crate. It provides
//! the bit/byte primitives, the XLEN/privilege-mode vocabulary, and the CSR
//! address space constants that every other subsystem (`rvcore-csr`,
//! `rvcore-mmu`, `rvcore-hart`, `rvcore-plic`) is built on top of.
//!
//! ## Modules
//!
//! - [`bitops`]: sign-extension and bit-field cut/replace helpers.
//! - [`memops`]: little-endian load/store over byte slices and raw host
//!   pointers, plus atomic read-modify-write helpers for AMO instructions.
//! - [`xlen`]: the [`xlen::Xlen`] register-width enum (RV32 / RV64).
//! - [`privilege`]: the [`privilege::PrivilegeMode`] enum.
//! - [`csr`]: CSR address constants, exception/interrupt cause codes.
//! - [`trap`]: the [`trap::TrapCause`] taxonomy shared by the CSR file and
//!   the hart execute loop.

pub mod bitops;
pub mod csr;
pub mod memops;
pub mod privilege;
pub mod trap;
pub mod xlen;

pub use privilege::PrivilegeMode;
pub use trap::TrapCause;
pub use xlen::Xlen;
