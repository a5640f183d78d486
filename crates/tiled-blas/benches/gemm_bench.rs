use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tiled_blas::prelude::*;

fn targets() -> Vec<Target> {
    let mut targets = vec![Target::HostTask];
    if cfg!(feature = "host-nest") {
        targets.push(Target::HostNest);
    }
    if cfg!(feature = "host-batch") {
        targets.push(Target::HostBatch);
    }
    targets.push(Target::Devices);
    targets
}

fn context(target: Target) -> Arc<Context> {
    match target {
        Target::Devices => Context::with_devices(2).unwrap(),
        _ => Context::local(),
    }
}

fn bench_gemm_f64(c: &mut Criterion) {
    let mut group = c.benchmark_group("TiledGemm_f64");
    group.sample_size(20);

    for size in [128, 256, 512].iter() {
        let n = *size;
        // 2 n^3 flops
        group.throughput(Throughput::Elements(2 * (n * n * n) as u64));

        for target in targets() {
            let ctx = context(target);
            let dist = Distribution::single();
            let a = Matrix::from_fn(n, n, 64, dist, Arc::clone(&ctx), |i, j| {
                ((i + j) % 100) as f64 * 0.01
            })
            .unwrap();
            let b = Matrix::from_fn(n, n, 64, dist, Arc::clone(&ctx), |i, j| {
                ((i * j) % 100) as f64 * 0.01
            })
            .unwrap();
            let cm = Matrix::<f64>::zeros(n, n, 64, dist, ctx).unwrap();
            let opts = Options::new().with_target(target).with_lookahead(1);

            group.bench_with_input(BenchmarkId::new(format!("{:?}", target), n), &n, |bench, _| {
                bench.iter(|| black_box(gemm(1.0, &a, &b, 0.0, &cm, &opts)).unwrap());
            });
        }
    }

    group.finish();
}

fn bench_syrk_lookahead(c: &mut Criterion) {
    let mut group = c.benchmark_group("TiledSyrk_lookahead");
    group.sample_size(20);

    let (n, k, nb) = (512, 512, 64);
    let ctx = Context::local();
    let dist = Distribution::single();
    let a = Matrix::from_fn(n, k, nb, dist, Arc::clone(&ctx), |i, j| {
        ((i * 3 + j) % 17) as f64 * 0.1
    })
    .unwrap();
    let s = SymmetricMatrix::new(Uplo::Lower, n, nb, dist, ctx).unwrap();
    s.insert_local_tiles().unwrap();

    for lookahead in [0, 1, 2, 4].iter() {
        let opts = Options::new().with_target(Target::HostTask).with_lookahead(*lookahead);
        group.bench_with_input(BenchmarkId::new("HostTask", lookahead), lookahead, |bench, _| {
            bench.iter(|| black_box(syrk(1.0, &a, 0.0, &s, &opts)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_gemm_f64, bench_syrk_lookahead);
criterion_main!(benches);
