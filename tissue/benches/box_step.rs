use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tissue::config::{PreconditionerName, SolverName};
use tissue::test_utils::*;
use tissue::SolverBuilder;

fn box_step_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("Box Step");
    group.sample_size(10);

    for res in [2, 4, 6] {
        let mesh = make_box([2 * res, res, res], [2.0, 1.0, 1.0]);
        for (solver_name, preconditioner_name) in [
            (SolverName::Cg, PreconditionerName::Jacobi),
            (SolverName::Cg, PreconditionerName::Ilu),
            (SolverName::Gmres, PreconditionerName::IluPp),
        ] {
            let mut config = cube_config();
            config.instationary.max_time_step_its = u64::MAX;
            config.linear_solver.solver_name = solver_name;
            config.linear_solver.preconditioner_name = preconditioner_name;

            group.bench_function(
                BenchmarkId::new(format!("{:?} {:?}", solver_name, preconditioner_name), res),
                |b| {
                    let mut engine = SolverBuilder::new(config.clone())
                        .set_mesh(mesh.clone())
                        .build()
                        .unwrap();
                    b.iter(|| engine.step().is_ok())
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, box_step_bench);
criterion_main!(benches);
