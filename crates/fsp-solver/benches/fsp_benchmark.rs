use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use fsp_solver::{FspSolver, SolverConfig, StateSpaceEnumeration, networks};
use std::hint::black_box;

fn bench_enumeration(c: &mut Criterion) {
    let mut group = c.benchmark_group("enumeration");

    for cr in [10u64, 50, 200] {
        group.bench_with_input(BenchmarkId::new("create_bijection_2d", cr), &cr, |b, &cr| {
            b.iter(|| black_box(StateSpaceEnumeration::new(cr, 2).unwrap().n_states()))
        });
    }

    group.finish();
}

fn bench_generator(c: &mut Criterion) {
    let mut group = c.benchmark_group("generator");

    for cr in [10u64, 30, 60] {
        let fsp = FspSolver::with_cr(networks::bursting_gene(), cr).unwrap();
        let params = [1.0, 1.0, 5.0, 1.0];
        group.bench_with_input(BenchmarkId::new("create_a", cr), &cr, |b, _| {
            b.iter(|| black_box(fsp.create_a(black_box(&params)).unwrap().nnz()))
        });
    }

    group.finish();
}

fn bench_sensitivities(c: &mut Criterion) {
    let mut group = c.benchmark_group("sensitivities");
    group.sample_size(10);

    for (label, parallel) in [("parallel", true), ("sequential", false)] {
        for cr in [10u64, 25] {
            let config = SolverConfig { parallel, ..SolverConfig::with_cr(cr) };
            let fsp = FspSolver::new(networks::bursting_gene(), config).unwrap();
            let init = fsp.point_mass_initial_state(&[0, 0]).unwrap();
            let params = [1.0, 1.0, 5.0, 1.0];
            group.bench_with_input(BenchmarkId::new(label, cr), &cr, |b, _| {
                b.iter(|| {
                    let m = fsp.marginals(&[0, 1], &init, &[0.5, 1.0, 2.0], &params).unwrap();
                    black_box(m[&1].mean())
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_enumeration, bench_generator, bench_sensitivities);
criterion_main!(benches);
