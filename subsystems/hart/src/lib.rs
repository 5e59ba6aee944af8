//! # rvcore-hart
//!
//! RV32/RV64 hart execution: register file, instruction decode/dispatch,
//! the fetch/decode/execute/event-check loop, trap entry/exit, and
//! interrupt acceptance. This is the single-writer owner of one hart's
//! architectural state; everything it touches in
//! `rvcore-mmu`/`rvcore-csr`/`rvcore-physmem` is either owned exclusively by
//! this hart or accessed through the atomics those crates already expose.

pub mod decode;
pub mod events;
pub mod hart;
pub mod inst;
pub mod regfile;
pub mod timer;

pub use events::EventFlags;
pub use hart::Hart;
pub use inst::Inst;
pub use regfile::RegFile;
pub use timer::Timer;
