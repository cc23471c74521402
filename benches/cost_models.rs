use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tncplan::costmodel::config::TuningConfig;
use tncplan::costmodel::cubic::{cube_features, CubicCostModel};
use tncplan::costmodel::linear::LinearCostModel;
use tncplan::costmodel::Sample;

fn estimate(c: &mut Criterion) {
    let linear = LinearCostModel::new("linear", &[1e-9, 2e-9, 3e-9, 4e-9], TuningConfig::default())
        .unwrap();
    let cubic = CubicCostModel::new("cubic", 4, &[1e-9; 34], TuningConfig::default()).unwrap();
    let features = [1e6, 2e6, 3e6, 4e6];

    c.bench_function("linear_estimate", |b| {
        b.iter(|| linear.estimate(black_box(&features)))
    });
    c.bench_function("cubic_estimate", |b| b.iter(|| cubic.estimate(black_box(&features))));
    c.bench_function("cube_features", |b| b.iter(|| cube_features(black_box(&features))));
}

fn observe(c: &mut Criterion) {
    let mut linear =
        LinearCostModel::new("linear", &[1e-9, 2e-9], TuningConfig::default()).unwrap();
    c.bench_function("linear_observe", |b| {
        b.iter(|| linear.observe(Sample::new(black_box(0.5), vec![1e6, 2e6])))
    });
}

criterion_group!(benches, estimate, observe);
criterion_main!(benches);
