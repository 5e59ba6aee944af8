//! Hart fetch/decode/execute throughput: a tight `addi`/`jal` loop held
//! entirely in a single 4 KiB RAM page, so this measures the execute loop
//! itself rather than memory or TLB behaviour.

use std::time::Instant;

use rvcore_hal::xlen::Xlen;
use rvcore_hart::Hart;
use rvcore_physmem::{MmioBus, PhysMem};

use crate::BenchResult;

const BASE: u64 = 0x8000_0000;

/// `addi x1, x1, 1` followed by `jal x0, -4`: an infinite loop that
/// increments `x1` once per step.
const ADDI_X1_X1_1: u32 = 0x0010_8093;
const JAL_SELF_MINUS_4: u32 = 0xffdf_f06f;

#[must_use]
pub fn run(iterations: u64) -> BenchResult {
    let mut ram = PhysMem::new(BASE, 0x1000);
    ram.write(BASE, &ADDI_X1_X1_1.to_le_bytes()).unwrap();
    ram.write(BASE + 4, &JAL_SELF_MINUS_4.to_le_bytes()).unwrap();
    let bus = MmioBus::new();

    let mut hart = Hart::new(0, Xlen::Rv64, BASE);

    let start = Instant::now();
    for _ in 0..iterations {
        hart.step(&ram, &bus);
    }
    let elapsed = start.elapsed();

    BenchResult {
        name: "hart_decode_execute",
        iterations,
        elapsed,
    }
}
