//! # rvcore-machine
//!
//! The machine orchestrator: owns guest RAM, the MMIO bus, the PLIC and
//! every hart, and drives the lifecycle from construction through hart
//! thread spawn, pause/resume, reset and teardown. This is the crate an
//! embedder (a CLI launcher, a test harness) depends on directly; every
//! other `rvcore-*` crate is an implementation detail reached through this
//! one's public API.

pub mod boot;
pub mod config;
pub mod error;
pub mod fdt;
pub mod lifecycle;
pub mod machine;

pub use config::{MachineConfig, XlenConfig};
pub use error::MachineError;
pub use lifecycle::LifecycleStage;
pub use machine::Machine;
