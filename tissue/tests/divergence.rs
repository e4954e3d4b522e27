use tissue::boundary::BoundaryConditions;
use tissue::config::NonConvergencePolicy;
use tissue::fem::*;
use tissue::linalg::{Kernel, Layout, SparseMatrix};
use tissue::linsolve::precond::PreconditionerKind;
use tissue::linsolve::{Criteria, LinearSolver, SolverKind};
use tissue::{BuildError, DivergenceReason, Error};

pub use test_utils::*;

mod test_utils;

/// Operators of a floating cube without any stiffness.
fn floating_cube_without_stiffness() -> Operators {
    let mesh = make_unit_cube();
    let params = AssemblyParams {
        material: Material {
            density: 100.0,
            lambda: 0.0,
            mu: 0.0,
            gravity: [0.0; 3],
        },
        quadrature_order: 2,
        degree: 1,
        layout: Layout::Csr,
        kernel: Kernel::Naive,
    };
    let mut bcs = BoundaryConditions::new();
    bcs.add_neumann(LOADED_TAG, 40.0, tissue::Polarity::Outward)
        .unwrap();
    let operators = OperatorAssembler::new(&mesh, params)
        .unwrap()
        .assemble(&bcs)
        .unwrap();
    assert!(operators.dirichlet.is_empty());
    operators
}

#[test]
fn singular_stiffness_is_never_solved_silently() {
    init_logger();
    let operators = floating_cube_without_stiffness();
    let n = operators.num_dofs();
    let solver = LinearSolver::new(SolverKind::ConjugateGradient, Criteria::default());

    assert!(matches!(
        PreconditionerKind::Jacobi.build(&operators.stiffness),
        Err(BuildError::ZeroDiagonal { .. })
    ));
    assert!(PreconditionerKind::Ilu0.build(&operators.stiffness).is_err());

    let identity = PreconditionerKind::Identity
        .build(&operators.stiffness)
        .unwrap();
    let mut x = vec![0.0; n];
    match solver.solve(
        &operators.stiffness,
        &operators.load,
        &mut x,
        identity.as_ref(),
        &mut || false,
    ) {
        Err(Error::SolverDivergence { reason, .. }) => {
            assert_eq!(reason, DivergenceReason::Breakdown)
        }
        other => panic!("expected a breakdown, got {:?}", other),
    }
    assert!(x.iter().all(|x| x.is_finite()));
}

fn params(preconditioner: PreconditionerKind) -> IntegratorParams {
    IntegratorParams {
        scheme: TimeIntegration::default(),
        time_step: 0.1,
        max_steps: 10,
        damping: Damping::default(),
        solver: LinearSolver::new(SolverKind::ConjugateGradient, Criteria::default()),
        preconditioner,
        non_convergence: NonConvergencePolicy::Abort,
    }
}

#[test]
fn indefinite_effective_operator_diverges_the_integrator() {
    init_logger();
    let n = 12;
    let load = utils::random_vector(n, 5);
    // The effective operator 400 M + K is negative definite.
    let operators = Operators {
        mass: SparseMatrix::identity(n, Layout::Csr, Kernel::Naive),
        stiffness: SparseMatrix::from_triplets(
            n,
            &(0..n).map(|i| (i, i, -1000.0)).collect::<Vec<_>>(),
            Layout::Csr,
            Kernel::Naive,
        )
        .unwrap(),
        load,
        dirichlet: Vec::new(),
    };
    let mut integrator = TimeIntegrator::new(operators, params(PreconditionerKind::Identity)).unwrap();
    let initial = integrator.state().clone();

    assert!(matches!(
        integrator.step(),
        Err(Error::SolverDivergence {
            reason: DivergenceReason::Breakdown,
            ..
        })
    ));
    assert_eq!(integrator.phase(), Phase::Diverged);
    assert_eq!(integrator.state(), &initial);
    assert!(matches!(
        integrator.step(),
        Err(Error::InvalidPhase {
            phase: Phase::Diverged,
            ..
        })
    ));
}

#[test]
fn massless_body_fails_to_initialize() {
    init_logger();
    let mut operators = floating_cube_without_stiffness();
    operators.mass.scale(0.0);
    assert!(matches!(
        TimeIntegrator::new(operators.clone(), params(PreconditionerKind::Jacobi)),
        Err(Error::PreconditionerBuild {
            source: BuildError::ZeroDiagonal { .. }
        })
    ));
    assert!(matches!(
        TimeIntegrator::new(operators, params(PreconditionerKind::Identity)),
        Err(Error::SolverDivergence { .. })
    ));
}

#[test]
fn residual_limit_aborts_a_quasi_static_solve() {
    init_logger();
    let mut config = cube_config();
    config.instationary.solve_instationary = false;
    // The initial residual alone exceeds this limit.
    config.linear_solver.divergence_limit = 1e-3;
    let mut solver = tissue::SolverBuilder::new(config)
        .set_mesh(make_unit_cube())
        .build()
        .unwrap();
    match solver.step() {
        Err(err @ Error::SolverDivergence { .. }) => {
            assert_eq!(err.exit_code(), 6);
            assert!(matches!(
                err,
                Error::SolverDivergence {
                    reason: DivergenceReason::ResidualLimit,
                    ..
                }
            ));
        }
        other => panic!("expected divergence, got {:?}", other.map(|r| r.step)),
    }
    assert_eq!(solver.phase(), Phase::Diverged);
    assert!(solver.step().is_err());
}

#[test]
fn residual_limit_aborts_dynamic_setup() {
    init_logger();
    let mut config = cube_config();
    // The initial residual alone exceeds this limit.
    config.linear_solver.divergence_limit = 1e-3;
    assert!(matches!(
        tissue::SolverBuilder::new(config)
            .set_mesh(make_unit_cube())
            .build(),
        Err(Error::SolverDivergence {
            reason: DivergenceReason::ResidualLimit,
            ..
        })
    ));
}
