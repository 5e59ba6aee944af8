//! # Boot protocol
//!
//! Register and firmware-handoff conventions a loader (out of scope for
//! this crate) relies on to hand control to guest firmware: `a0 = hartid`,
//! `a1 = dtb_addr`, and, when launching M-mode firmware directly, an
//! OpenSBI FW_DYNAMIC info struct pointed to by `a2`.

use rvcore_hal::xlen::Xlen;
use rvcore_hart::Hart;

/// FW_DYNAMIC magic (`"OSBI"`-derived constant OpenSBI itself uses).
pub const FW_DYNAMIC_MAGIC: u32 = 0x4942_534F;
/// FW_DYNAMIC struct version this crate emits.
pub const FW_DYNAMIC_VERSION: u32 = 2;

/// Register indices for the boot-time argument convention (RISC-V calling
/// convention `a0`/`a1`/`a2`).
const REG_A0: u8 = 10;
const REG_A1: u8 = 11;
const REG_A2: u8 = 12;

/// The OpenSBI FW_DYNAMIC handoff struct. Every field is encoded at the
/// hart's native width (4 bytes on RV32, 8 on RV64); the 24-byte literal
/// layout is the RV32 case (six 4-byte fields).
#[derive(Debug, Clone, Copy)]
pub struct FwDynamicInfo {
    pub next_addr: u64,
    pub next_mode: u64,
    pub options: u64,
    pub boot_hart: u64,
}

impl FwDynamicInfo {
    /// Serialize this struct little-endian at `xlen`'s native width.
    #[must_use]
    pub fn to_bytes(self, xlen: Xlen) -> Vec<u8> {
        let width = (xlen.bits() / 8) as usize;
        let fields = [
            u64::from(FW_DYNAMIC_MAGIC),
            u64::from(FW_DYNAMIC_VERSION),
            self.next_addr,
            self.next_mode,
            self.options,
            self.boot_hart,
        ];
        let mut out = Vec::with_capacity(width * fields.len());
        for field in fields {
            if width == 4 {
                out.extend_from_slice(&(field as u32).to_le_bytes());
            } else {
                out.extend_from_slice(&field.to_le_bytes());
            }
        }
        out
    }
}

/// Write `a0 = hartid`, `a1 = dtb_addr` and, if given, `a2 = fw_dynamic_info_addr`
/// into a hart's register file before its thread starts executing.
pub fn set_boot_registers(hart: &mut Hart, hartid: u64, dtb_addr: u64, fw_dynamic_info_addr: Option<u64>) {
    hart.regs_mut().write(REG_A0, hartid);
    hart.regs_mut().write(REG_A1, dtb_addr);
    if let Some(addr) = fw_dynamic_info_addr {
        hart.regs_mut().write(REG_A2, addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rv32_struct_is_24_bytes() {
        let info = FwDynamicInfo {
            next_addr: 0x8020_0000,
            next_mode: 1,
            options: 0,
            boot_hart: 0,
        };
        assert_eq!(info.to_bytes(Xlen::Rv32).len(), 24);
    }

    #[test]
    fn rv32_magic_is_little_endian_first_word() {
        let info = FwDynamicInfo {
            next_addr: 0,
            next_mode: 0,
            options: 0,
            boot_hart: 0,
        };
        let bytes = info.to_bytes(Xlen::Rv32);
        assert_eq!(&bytes[0..4], &FW_DYNAMIC_MAGIC.to_le_bytes());
    }

    #[test]
    fn boot_registers_land_on_a0_a1_a2() {
        let mut hart = Hart::new(0, Xlen::Rv64, 0x8000_0000);
        set_boot_registers(&mut hart, 2, 0x8800_0000, Some(0x8810_0000));
        assert_eq!(hart.regs().read(REG_A0), 2);
        assert_eq!(hart.regs().read(REG_A1), 0x8800_0000);
        assert_eq!(hart.regs().read(REG_A2), 0x8810_0000);
    }
}
