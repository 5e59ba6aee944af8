//! # rvcore-benchmarks
//!
//! Hand-rolled micro-benchmarks for the three hot paths of the emulator
//! core: the hart fetch/decode/execute loop, MMU translation (TLB-hit
//! path), and PLIC claim/complete. No benchmarking crate is pulled in here
//! (see `DESIGN.md`); each benchmark is a plain `std::time::Instant`-timed
//! loop, with Cargo feature flags scaling the workload size instead of a
//! benchmark-harness dependency.

pub mod hart_bench;
pub mod mmu_bench;
pub mod plic_bench;

use std::time::Duration;

/// Default iteration count for a benchmark, scaled up under the `extended`/
/// `stress` feature flags.
#[must_use]
pub const fn default_iterations() -> u64 {
    if cfg!(feature = "stress") {
        50_000_000
    } else if cfg!(feature = "extended") {
        5_000_000
    } else {
        200_000
    }
}

/// The outcome of one benchmark run.
#[derive(Debug, Clone, Copy)]
pub struct BenchResult {
    pub name: &'static str,
    pub iterations: u64,
    pub elapsed: Duration,
}

impl BenchResult {
    #[must_use]
    pub fn ops_per_sec(&self) -> f64 {
        self.iterations as f64 / self.elapsed.as_secs_f64()
    }
}

/// Run every benchmark at the default iteration count for this build's
/// feature flags.
#[must_use]
pub fn run_all() -> Vec<BenchResult> {
    let iterations = default_iterations();
    vec![
        hart_bench::run(iterations),
        mmu_bench::run(iterations),
        plic_bench::run(iterations),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_benchmark_reports_a_nonzero_rate() {
        for result in [
            hart_bench::run(1_000),
            mmu_bench::run(1_000),
            plic_bench::run(1_000),
        ] {
            assert_eq!(result.iterations, 1_000);
            assert!(result.ops_per_sec() > 0.0);
        }
    }
}
