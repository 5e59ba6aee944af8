//! Command-line entry point: runs every benchmark once and prints
//! throughput. Iteration counts scale with the `extended`/`stress`
//! features baked into this binary at build time.

fn main() {
    env_logger::init();
    log::info!("iterations per benchmark: {}", rvcore_benchmarks::default_iterations());

    for result in rvcore_benchmarks::run_all() {
        println!(
            "{:<24} {:>12} iters in {:>9.3?}  ({:>12.0} ops/s)",
            result.name,
            result.iterations,
            result.elapsed,
            result.ops_per_sec(),
        );
    }
}
