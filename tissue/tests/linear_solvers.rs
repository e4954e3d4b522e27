use approx::*;
use tissue::fem::{AssemblyParams, Material, OperatorAssembler};
use tissue::linalg::{Kernel, Layout, LinearOperator, SparseMatrix};
use tissue::linsolve::precond::{MultilevelParams, PreconditionerKind};
use tissue::linsolve::{Criteria, LinearSolver, SolverKind, Status};

pub use test_utils::*;

mod test_utils;

const LAYOUTS: [Layout; 4] = [Layout::Dense, Layout::Csr, Layout::Coo, Layout::Ell];
const KERNELS: [Kernel; 3] = [Kernel::Naive, Kernel::Blas, Kernel::Threaded];

fn solver_kinds() -> Vec<SolverKind> {
    vec![
        SolverKind::ConjugateGradient,
        SolverKind::Gmres { restart: 30 },
        SolverKind::ConjugateResidual,
        SolverKind::BiCgStab,
    ]
}

fn criteria() -> Criteria {
    Criteria {
        absolute_tolerance: 1e-14,
        relative_tolerance: 1e-10,
        max_iterations: 2000,
        divergence_limit: 1e8,
    }
}

/// Clamped and pushed stiffness matrix of a tetrahedral bar.
fn bar_stiffness(layout: Layout, kernel: Kernel) -> (SparseMatrix, Vec<f64>) {
    let mesh = make_tet_box([6, 2, 2], [3.0, 1.0, 1.0]);
    let params = AssemblyParams {
        material: Material::from(&soft_material()),
        quadrature_order: 2,
        degree: 1,
        layout,
        kernel,
    };
    let operators = OperatorAssembler::new(&mesh, params)
        .unwrap()
        .assemble(&clamp_and_push(40.0))
        .unwrap();
    (operators.stiffness, operators.load)
}

#[test]
fn random_spd_systems_are_solved_by_every_solver() {
    init_logger();
    let n = 200;
    for seed in 0..3 {
        let triplets = utils::random_spd_triplets(n, 4, 0.5, seed);
        let b = utils::random_vector(n, 100 + seed);
        for layout in [Layout::Csr, Layout::Ell] {
            let mtx = SparseMatrix::from_triplets(n, &triplets, layout, Kernel::Naive).unwrap();
            let precond = PreconditionerKind::Jacobi.build(&mtx).unwrap();
            for kind in solver_kinds() {
                let mut x = vec![0.0; n];
                let result = LinearSolver::new(kind, criteria())
                    .solve(&mtx, &b, &mut x, precond.as_ref(), &mut || false)
                    .unwrap();
                assert_eq!(result.status, Status::Success, "{:?}", kind);
                assert!(
                    relative_residual(&mtx, &b, &x) <= 1e-8,
                    "{:?} on {:?} (seed {})",
                    kind,
                    layout,
                    seed
                );
            }
        }
    }
}

/// The bar system with its unknowns rescaled by factors between 1 and 100.
fn scaled_bar_system() -> (SparseMatrix, Vec<f64>) {
    let (stiffness, load) = bar_stiffness(Layout::Csr, Kernel::Naive);
    let n = stiffness.size();
    let scale: Vec<f64> = (0..n).map(|i| 10f64.powf((i % 5) as f64 / 2.0)).collect();
    let triplets: Vec<_> = stiffness
        .to_csr()
        .triplet_iter()
        .map(|(i, j, v)| (i, j, scale[i] * v * scale[j]))
        .collect();
    let mtx = SparseMatrix::from_triplets(n, &triplets, Layout::Csr, Kernel::Naive).unwrap();
    let rhs = load.iter().zip(&scale).map(|(b, d)| b * d).collect();
    (mtx, rhs)
}

/// Iterations taken with the given preconditioner. Only preconditioned solves must converge.
fn iterations(solver: &LinearSolver, mtx: &SparseMatrix, b: &[f64], kind: PreconditionerKind) -> u32 {
    let precond = kind.build(mtx).unwrap();
    let mut x = vec![0.0; mtx.size()];
    let result = solver
        .solve(mtx, b, &mut x, precond.as_ref(), &mut || false)
        .unwrap();
    if kind != PreconditionerKind::Identity {
        assert!(result.converged(), "{:?}: {}", kind, result);
        assert!(relative_residual(mtx, b, &x) <= 1e-8, "{:?}", kind);
    }
    result.iterations
}

#[test]
fn preconditioners_reduce_iterations() {
    init_logger();
    let (mtx, b) = scaled_bar_system();
    let solver = LinearSolver::new(SolverKind::ConjugateGradient, criteria());
    let plain = iterations(&solver, &mtx, &b, PreconditionerKind::Identity);
    for kind in [
        PreconditionerKind::Jacobi,
        PreconditionerKind::Sor {
            omega: 1.0,
            symmetric: true,
        },
        PreconditionerKind::Sor {
            omega: 1.2,
            symmetric: true,
        },
        PreconditionerKind::Ilu0,
        PreconditionerKind::IluK { level: 2 },
    ] {
        let count = iterations(&solver, &mtx, &b, kind);
        assert!(count < plain, "{:?}: {} vs {} unpreconditioned", kind, count, plain);
    }
}

#[test]
fn unsymmetric_preconditioners_reduce_gmres_iterations() {
    init_logger();
    let (mtx, b) = scaled_bar_system();
    let solver = LinearSolver::new(SolverKind::Gmres { restart: 50 }, criteria());
    let plain = iterations(&solver, &mtx, &b, PreconditionerKind::Identity);
    for kind in [
        PreconditionerKind::Sor {
            omega: 1.0,
            symmetric: false,
        },
        PreconditionerKind::Sor {
            omega: 1.2,
            symmetric: false,
        },
        PreconditionerKind::Ilut {
            drop_tolerance: 1e-4,
            fill_factor: 3.0,
        },
        PreconditionerKind::Multilevel(MultilevelParams::default()),
    ] {
        let count = iterations(&solver, &mtx, &b, kind);
        assert!(count < plain, "{:?}: {} vs {} unpreconditioned", kind, count, plain);
    }
}

#[test]
fn layouts_and_kernels_agree() {
    init_logger();
    let n = 150;
    let triplets = utils::random_spd_triplets(n, 5, 1.0, 7);
    let x = utils::random_vector(n, 8);
    let reference = SparseMatrix::from_triplets(n, &triplets, Layout::Csr, Kernel::Naive).unwrap();
    let mut expected = vec![0.0; n];
    reference.apply(&x, &mut expected).unwrap();

    for layout in LAYOUTS {
        for kernel in KERNELS {
            let mtx = SparseMatrix::from_triplets(n, &triplets, layout, kernel).unwrap();
            assert_eq!(mtx.layout(), layout);
            let mut y = vec![1.0; n];
            mtx.apply_scaled(2.0, &x, -1.0, &mut y).unwrap();
            for (y, e) in y.iter().zip(expected.iter()) {
                assert_relative_eq!(*y, 2.0 * e - 1.0, max_relative = 1e-12, epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn assembled_systems_agree_across_layouts() {
    init_logger();
    let (reference, load) = bar_stiffness(Layout::Csr, Kernel::Naive);
    let n = reference.size();
    let solver = LinearSolver::new(SolverKind::ConjugateGradient, criteria());
    let precond = PreconditionerKind::Jacobi.build(&reference).unwrap();
    let mut expected = vec![0.0; n];
    solver
        .solve(&reference, &load, &mut expected, precond.as_ref(), &mut || false)
        .unwrap();

    for layout in [Layout::Dense, Layout::Coo, Layout::Ell] {
        let (stiffness, other_load) = bar_stiffness(layout, Kernel::Threaded);
        assert_eq!(load, other_load);
        for (row, col, value) in reference.to_csr().triplet_iter() {
            assert_eq!(stiffness.get(row, col), value);
        }
        let mut x = vec![0.0; n];
        solver
            .solve(&stiffness, &load, &mut x, precond.as_ref(), &mut || false)
            .unwrap();
        for (x, e) in x.iter().zip(expected.iter()) {
            assert_relative_eq!(*x, *e, max_relative = 1e-6, epsilon = 1e-10);
        }
    }
}
