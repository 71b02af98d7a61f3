use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nitsche::nl::NonlinearProblem;
use nitsche::quadrature::FacetQuadrature;
use nitsche::{test_utils::*, *};

fn two_blocks_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("Two Blocks");
    group.sample_size(10);

    for n in [4, 8, 16] {
        let config = compression_scene(0.0, n, 0.01);
        group.bench_function(BenchmarkId::new("Solve", n), |b| {
            b.iter(|| config.run().is_ok())
        });

        let (mesh, tags) = make_two_blocks(-0.01, n);
        let material = physical_params().material().unwrap();
        let nitsche = nitsche_params(1.0).validate().unwrap();
        let mut problem = ContactProblem::new(
            &mesh,
            &tags,
            &[unbiased_pair()],
            &material,
            &nitsche,
            &compression(0.01),
            FacetQuadrature::new(3).unwrap(),
        )
        .unwrap();
        let x = vec![0.0; mesh.num_dofs()];
        let mut r = vec![0.0; mesh.num_dofs()];
        let mut jac = problem.new_jacobian();

        group.bench_function(BenchmarkId::new("Update", n), |b| {
            b.iter(|| problem.update_coefficients(&x).is_ok())
        });
        problem.update_coefficients(&x).unwrap();
        group.bench_function(BenchmarkId::new("Assemble", n), |b| {
            b.iter(|| {
                problem.residual(&x, &mut r).is_ok() && problem.jacobian(&x, &mut jac).is_ok()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, two_blocks_bench);
criterion_main!(benches);
