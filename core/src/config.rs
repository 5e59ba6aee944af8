//! # Machine configuration
//!
//! The parameters an embedder supplies to construct a [`crate::Machine`]:
//! hart count and width, guest RAM placement, and PLIC sizing. No on-disk
//! format is mandated here — an embedder-level CLI can load one of these
//! from TOML/JSON via `serde` and hand it to [`crate::Machine::new`].

use rvcore_hal::xlen::Xlen;
use rvcore_physmem::DEFAULT_MEM_BASE;
use serde::{Deserialize, Serialize};

/// Serializable mirror of [`rvcore_hal::xlen::Xlen`]; kept local to this
/// crate so `rvcore-hal` stays free of a `serde` dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XlenConfig {
    Rv32,
    Rv64,
}

impl From<XlenConfig> for Xlen {
    fn from(value: XlenConfig) -> Self {
        match value {
            XlenConfig::Rv32 => Xlen::Rv32,
            XlenConfig::Rv64 => Xlen::Rv64,
        }
    }
}

/// Construction parameters for a [`crate::Machine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Number of harts to create.
    pub hart_count: usize,
    /// Register/address width shared by every hart.
    pub xlen: XlenConfig,
    /// Guest physical base address of RAM.
    pub mem_base: u64,
    /// Guest RAM size, a multiple of 4 KiB.
    pub mem_size: u64,
    /// Reset PC every hart starts executing from. Defaults to `mem_base`.
    pub reset_pc: u64,
    /// Guest physical base address the PLIC is attached at.
    pub plic_base: u64,
    /// Number of PLIC interrupt sources (source 0 is reserved).
    pub plic_num_sources: usize,
    /// Number of PLIC contexts. Defaults to `hart_count * 2` (one
    /// machine-mode and one supervisor-mode context per hart).
    pub plic_num_contexts: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        let hart_count = 1;
        Self {
            hart_count,
            xlen: XlenConfig::Rv64,
            mem_base: DEFAULT_MEM_BASE,
            mem_size: 128 * 1024 * 1024,
            reset_pc: DEFAULT_MEM_BASE,
            plic_base: 0x0C00_0000,
            plic_num_sources: 32,
            plic_num_contexts: hart_count * 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reset_pc_matches_mem_base() {
        let config = MachineConfig::default();
        assert_eq!(config.reset_pc, config.mem_base);
    }

    #[test]
    fn round_trips_through_json() {
        let config = MachineConfig {
            hart_count: 4,
            xlen: XlenConfig::Rv32,
            ..MachineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: MachineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.hart_count, 4);
        assert_eq!(back.xlen, XlenConfig::Rv32);
    }
}
