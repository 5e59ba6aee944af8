//! PLIC claim/complete throughput: one source routed to one context,
//! repeatedly asserted, claimed and completed.

use std::time::Instant;

use rvcore_plic::{ContextId, Plic};

use crate::BenchResult;

const SOURCE: usize = 1;

#[must_use]
pub fn run(iterations: u64) -> BenchResult {
    let plic = Plic::new(8, 2);
    let ctx = ContextId::machine(0);
    plic.set_priority(SOURCE, 1);
    plic.set_threshold(ctx, 0);
    plic.set_enable(ctx, SOURCE, true);

    let start = Instant::now();
    for _ in 0..iterations {
        plic.send_irq(SOURCE);
        let claimed = plic.claim(ctx);
        debug_assert_eq!(claimed as usize, SOURCE);
        plic.complete(ctx, claimed);
    }
    let elapsed = start.elapsed();

    BenchResult {
        name: "plic_claim_complete",
        iterations,
        elapsed,
    }
}
