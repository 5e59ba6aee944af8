//! # rvcore-csr
//!
//! The per-hart control-and-status-register file: SWAP/SET/CLEAR op
//! semantics, WARL masking for `mstatus`/`sstatus`, read-only `misa`/
//! vendor-id registers, and the per-privilege trap-state bank
//! (`tvec`/`epc`/`cause`/`tval`/`scratch`/`counteren`) that trap entry and
//! `xRET` read and write directly.

pub mod file;
pub mod op;

pub use file::CsrFile;
pub use op::CsrOp;
