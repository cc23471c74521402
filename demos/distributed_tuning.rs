use std::time::Instant;

use log::{info, LevelFilter};
use mpi::topology::SimpleCommunicator;
use tncplan::collective::Collective;
use tncplan::costmodel::config::TuningConfig;
use tncplan::costmodel::linear::LinearCostModel;
use tncplan::costmodel::registry::ModelRegistry;
use tncplan::costmodel::Sample;
use tncplan::logging::setup_logging_rank;
use tncplan::topology::folding::fold_torus;
use tncplan::topology::registry::TopologyRegistry;
use tncplan::topology::Topology;

/// Factors `n` into a grid shape of small primes, smallest first.
fn prime_shape(mut n: usize) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut p = 2;
    while n > 1 {
        while n % p == 0 {
            shape.push(p);
            n /= p;
        }
        p += 1;
    }
    if shape.is_empty() {
        shape.push(1);
    }
    shape
}

/// A stand-in for a local kernel whose cost grows with `work`.
fn busy_work(work: usize) -> f64 {
    (0..work).map(|i| (i as f64).sqrt()).sum()
}

// Run with e.g. `mpirun -n 8 target/release/examples/distributed_tuning`
fn main() {
    let universe = mpi::initialize().unwrap();
    let world: SimpleCommunicator = universe.world();
    let rank = Collective::rank(&world);
    let size = Collective::size(&world);
    let _logger = setup_logging_rank(rank, LevelFilter::Debug).unwrap();
    info!(rank, size; "Logging setup");

    // Enumerate all grids reachable by folding
    let mut topologies = TopologyRegistry::default();
    let root = topologies.register(Topology::from_shape(&world, &prime_shape(size)));
    let mut frontier = vec![root];
    while let Some(index) = frontier.pop() {
        let grid = topologies.get(index).clone();
        let before = topologies.len();
        let indices = fold_torus(&grid, &world, |topology| topologies.register(topology));
        frontier.extend(indices.into_iter().filter(|&i| i >= before));
    }
    for topology in &topologies {
        info!(topology:%; "Candidate grid");
    }

    // Calibrate a model of the local kernel
    let mut models = ModelRegistry::new();
    let kernel =
        LinearCostModel::registered("kernel", &[1e-9], TuningConfig::default(), &mut models)
            .unwrap();
    for i in 0..64 {
        let work = 200_000 + 10_000 * (i % 16) + 1_000 * rank;
        let start = Instant::now();
        std::hint::black_box(busy_work(work));
        let elapsed = start.elapsed().as_secs_f64().max(f64::MIN_POSITIVE);
        kernel
            .borrow_mut()
            .observe(Sample::new(elapsed, vec![work as f64]));
    }
    models.update_all(&world);

    if rank == 0 {
        models.describe_all();
        let estimate = kernel.borrow().estimate(&[1e6]);
        info!(estimate; "Estimated time for 1e6 work units");
    }
}
