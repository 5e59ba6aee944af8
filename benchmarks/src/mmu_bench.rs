//! MMU translation throughput on the TLB-hit path: one two-level SV32
//! mapping is installed, warmed once to populate the TLB, then read
//! repeatedly so the walker itself is off the hot path.

use std::time::Instant;

use rvcore_hal::privilege::PrivilegeMode;
use rvcore_mmu::{Mmu, Pte, PteFlags, Satp, SatpMode};
use rvcore_physmem::{MmioBus, PhysMem};

use crate::BenchResult;

const ROOT_ADDR: u64 = 0x8000_0000;
const LEAF_TABLE_ADDR: u64 = 0x8000_1000;
const TARGET_PHYS: u64 = 0x8000_2000;
const VADDR: u32 = 0;

fn pte_word(flags: PteFlags, phys_target: u64) -> u32 {
    (((phys_target >> 12) as u32) << 10) | flags.bits()
}

fn write_pte(ram: &mut PhysMem, addr: u64, flags: PteFlags, phys_target: u64) {
    let bits = pte_word(flags, phys_target);
    ram.write(addr, &bits.to_le_bytes()).unwrap();
}

#[must_use]
pub fn run(iterations: u64) -> BenchResult {
    let mut ram = PhysMem::new(ROOT_ADDR, 0x0001_0000);
    write_pte(&mut ram, ROOT_ADDR, PteFlags::VALID, LEAF_TABLE_ADDR);
    write_pte(
        &mut ram,
        LEAF_TABLE_ADDR,
        PteFlags::VALID | PteFlags::READ | PteFlags::WRITE,
        TARGET_PHYS,
    );
    ram.write(TARGET_PHYS, &[0u8; 8]).unwrap();
    debug_assert!(Pte::from_bits(pte_word(PteFlags::VALID, LEAF_TABLE_ADDR)).is_valid());

    let satp = Satp {
        mode: SatpMode::Sv32,
        asid: 0,
        ppn: (ROOT_ADDR / 4096) as u32,
    };
    let bus = MmioBus::new();
    let mut mmu = Mmu::new();
    let mut out = [0u8; 8];

    // Warm the TLB so the timed loop never walks the page table.
    mmu.read(&ram, &bus, satp, PrivilegeMode::Supervisor, false, VADDR, &mut out)
        .unwrap();

    let start = Instant::now();
    for _ in 0..iterations {
        mmu.read(&ram, &bus, satp, PrivilegeMode::Supervisor, false, VADDR, &mut out)
            .unwrap();
    }
    let elapsed = start.elapsed();

    BenchResult {
        name: "mmu_translate_tlb_hit",
        iterations,
        elapsed,
    }
}
