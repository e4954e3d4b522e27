use crate::boundary::BcData;
use crate::checkpoint::CheckpointStore;
use crate::config::lint::{lint_bc_data, Level};
use crate::config::{Config, ConfigError, NonConvergencePolicy};
use crate::fem::assembly::{AssemblyParams, Material, OperatorAssembler, Operators};
use crate::fem::dof_map::DofMap;
use crate::fem::integrator::{Damping, IntegratorParams, Phase, StepResult, TimeIntegrator};
use crate::fem::state::State;
use crate::linsolve::precond::PreconditionerKind;
use crate::linsolve::{LinearSolver, Status};
use crate::mesh::{refine_uniform, Mesh};
use crate::Error;

/// Boundary data points snap to vertices within this fraction of the mesh diameter.
const SNAP_TOLERANCE: f64 = 1e-6;

/// Collects the inputs of a simulation and builds a [`Solver`].
#[derive(Clone, Debug)]
pub struct SolverBuilder {
    config: Config,
    mesh: Option<Mesh>,
    bc_data: Option<BcData>,
    num_threads: Option<usize>,
}

impl SolverBuilder {
    pub fn new(config: Config) -> Self {
        SolverBuilder {
            config,
            mesh: None,
            bc_data: None,
            num_threads: None,
        }
    }

    /// Sets the unrefined mesh.
    pub fn set_mesh(&mut self, mesh: Mesh) -> &mut Self {
        self.mesh = Some(mesh);
        self
    }

    /// Sets point constraints and point forces.
    pub fn set_bc_data(&mut self, bc_data: BcData) -> &mut Self {
        self.bc_data = Some(bc_data);
        self
    }

    /// Overrides the number of worker threads, which defaults to the number of CPUs.
    pub fn set_num_threads(&mut self, num_threads: usize) -> &mut Self {
        self.num_threads = Some(num_threads);
        self
    }

    pub fn build(&self) -> Result<Solver, Error> {
        let config = &self.config;
        config.validate()?;

        let num_threads = self.num_threads.unwrap_or_else(num_cpus::get);
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
        {
            Ok(pool) => Some(pool),
            Err(err) => {
                log::warn!("Failed to create a thread pool, using the global pool: {}", err);
                None
            }
        };

        let mesh = self.mesh.as_ref().ok_or_else(|| ConfigError::Invalid {
            path: "mesh.filename".to_string(),
            message: "No mesh was provided".to_string(),
        })?;
        let mesh = refine_uniform(mesh, config.mesh.initial_ref_level)?;

        let mut bcs = config.boundary_conditions()?;
        if let Some(data) = &self.bc_data {
            let report = lint_bc_data(data);
            if let Some(entry) = report.entries().iter().find(|e| e.level == Level::Error) {
                return Err(ConfigError::Invalid {
                    path: entry.path.clone(),
                    message: entry.message.clone(),
                }
                .into());
            }
            bcs.add_bc_data(data, &mesh, SNAP_TOLERANCE * mesh.bounding_diameter())?;
        }
        if bcs.is_unconstrained() {
            log::warn!("No displacement is prescribed; the body is free floating");
        }

        let params = AssemblyParams {
            material: Material::from(&config.elasticity_model),
            quadrature_order: config.quadrature_order,
            degree: config.finite_elements.displacement_degree,
            layout: config.layout(),
            kernel: config.kernel()?,
        };
        let assembler = OperatorAssembler::new(&mesh, params)?;
        let operators = install(&pool, || assembler.assemble(&bcs))?;
        let dof_map = assembler.into_dof_map();

        let solver = LinearSolver::new(config.solver_kind(), config.criteria());
        let preconditioner = config.preconditioner_kind()?;
        let non_convergence = config.linear_solver.non_convergence;

        let checkpoint = if config.checkpoint.restore || config.checkpoint.interval > 0 {
            Some(CheckpointStore::new(&config.checkpoint.filename))
        } else {
            None
        };

        let mode = if config.instationary.solve_instationary {
            let inst = &config.instationary;
            let params = IntegratorParams {
                scheme: config.time_integration(),
                time_step: inst.delta_t,
                max_steps: inst.max_time_step_its,
                damping: Damping {
                    factor: inst.damping_factor,
                    alpha: inst.rayleigh_alpha,
                    beta: inst.rayleigh_beta,
                },
                solver,
                preconditioner,
                non_convergence,
            };
            let mut integrator = install(&pool, || TimeIntegrator::new(operators, params))?;
            if config.checkpoint.restore {
                if let Some(store) = &checkpoint {
                    let state = store
                        .load_at(dof_map.num_dofs(), config.checkpoint.resume_step)?;
                    integrator.restore(state)?;
                }
            }
            Mode::Dynamic(integrator)
        } else {
            if checkpoint.is_some() {
                log::warn!("Checkpoints are ignored by quasi-static solves");
            }
            Mode::Static(StaticSolve::new(
                operators,
                solver,
                preconditioner,
                non_convergence,
            ))
        };

        log::info!(
            "Solver ready: {} DOFs, {} threads",
            dof_map.num_dofs(),
            pool.as_ref()
                .map_or_else(rayon::current_num_threads, |p| p.current_num_threads())
        );

        Ok(Solver {
            config: config.clone(),
            mesh,
            dof_map,
            mode,
            checkpoint: if config.instationary.solve_instationary {
                checkpoint
            } else {
                None
            },
            pool,
        })
    }
}

fn install<R: Send>(pool: &Option<rayon::ThreadPool>, f: impl FnOnce() -> R + Send) -> R {
    match pool {
        Some(pool) => pool.install(f),
        None => f(),
    }
}

/// Single solve of `K u = F`.
struct StaticSolve {
    operators: Operators,
    solver: LinearSolver,
    preconditioner: PreconditionerKind,
    non_convergence: NonConvergencePolicy,
    state: State,
    phase: Phase,
    interrupter: Box<dyn FnMut() -> bool + Send>,
}

impl StaticSolve {
    fn new(
        operators: Operators,
        solver: LinearSolver,
        preconditioner: PreconditionerKind,
        non_convergence: NonConvergencePolicy,
    ) -> Self {
        let mut state = State::zeros(operators.num_dofs());
        operators.set_constrained(&mut state.u, |g| g);
        StaticSolve {
            operators,
            solver,
            preconditioner,
            non_convergence,
            state,
            phase: Phase::Initialized,
            interrupter: Box::new(|| false),
        }
    }

    fn step(&mut self) -> Result<StepResult, Error> {
        if self.phase != Phase::Initialized {
            return Err(Error::InvalidPhase {
                action: "step",
                phase: self.phase,
            });
        }
        self.phase = Phase::Stepping;
        let result = self.solve();
        match result {
            Ok(step_result) => {
                self.phase = Phase::Finished;
                Ok(step_result)
            }
            Err(Error::Interrupted) => {
                self.phase = Phase::Initialized;
                Err(Error::Interrupted)
            }
            Err(err) => {
                self.phase = Phase::Diverged;
                Err(err)
            }
        }
    }

    fn solve(&mut self) -> Result<StepResult, Error> {
        let StaticSolve {
            ref operators,
            ref solver,
            ref preconditioner,
            non_convergence,
            ref mut state,
            ref mut interrupter,
            ..
        } = *self;
        let mut rhs = operators.load.clone();
        operators.set_constrained(&mut rhs, |g| g);
        let mut u = state.u.clone();

        let precond = preconditioner.build(&operators.stiffness)?;
        let solve = solver.solve(
            &operators.stiffness,
            &rhs,
            &mut u,
            precond.as_ref(),
            &mut **interrupter,
        )?;
        match solve.status {
            Status::Success => {}
            Status::Interrupted => return Err(Error::Interrupted),
            Status::MaximumIterationsExceeded => match non_convergence {
                NonConvergencePolicy::Abort => {
                    return Err(Error::SolverNonConvergence { step: 1, result: solve })
                }
                NonConvergencePolicy::Continue => {
                    log::warn!("Static solve did not converge: {}", solve)
                }
            },
        }
        state.u = u;
        state.step = 1;
        log::info!("Static solve: {}", solve);
        Ok(StepResult {
            step: 1,
            time: 0.0,
            solve,
        })
    }
}

enum Mode {
    Dynamic(TimeIntegrator),
    Static(StaticSolve),
}

/// Finite element engine.
///
/// Owns the refined mesh, the DOF numbering and either a time integrator or, when instationary
/// solving is disabled, a single quasi-static solve.
pub struct Solver {
    config: Config,
    mesh: Mesh,
    dof_map: DofMap,
    mode: Mode,
    checkpoint: Option<CheckpointStore>,
    pool: Option<rayon::ThreadPool>,
}

impl Solver {
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Refined mesh the problem is solved on.
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn dof_map(&self) -> &DofMap {
        &self.dof_map
    }

    pub fn state(&self) -> &State {
        match &self.mode {
            Mode::Dynamic(integrator) => integrator.state(),
            Mode::Static(s) => &s.state,
        }
    }

    pub fn phase(&self) -> Phase {
        match &self.mode {
            Mode::Dynamic(integrator) => integrator.phase(),
            Mode::Static(s) => s.phase,
        }
    }

    /// Time integrator of a dynamic simulation.
    pub fn integrator(&self) -> Option<&TimeIntegrator> {
        match &self.mode {
            Mode::Dynamic(integrator) => Some(integrator),
            Mode::Static(_) => None,
        }
    }

    /// Number of steps of the whole run. A quasi-static run has a single step.
    pub fn max_steps(&self) -> u64 {
        match &self.mode {
            Mode::Dynamic(integrator) => integrator.max_steps(),
            Mode::Static(_) => 1,
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.mode {
            Mode::Dynamic(integrator) => integrator.is_finished(),
            Mode::Static(s) => s.phase == Phase::Finished,
        }
    }

    /// Sets the function polled between linear solver iterations.
    pub fn set_interrupter(&mut self, interrupted: impl FnMut() -> bool + Send + 'static) {
        match &mut self.mode {
            Mode::Dynamic(integrator) => integrator.set_interrupter(interrupted),
            Mode::Static(s) => s.interrupter = Box::new(interrupted),
        }
    }

    /// Displacement of every mesh vertex.
    pub fn vertex_displacements(&self) -> Vec<[f64; 3]> {
        self.state().displacements(self.mesh.num_nodes())
    }

    /// Writes the current state to the configured checkpoint file.
    pub fn save_checkpoint(&self) -> Result<(), Error> {
        let store = self
            .checkpoint
            .clone()
            .unwrap_or_else(|| CheckpointStore::new(&self.config.checkpoint.filename));
        Ok(store.save(self.state())?)
    }

    /// Takes one step, saving a checkpoint when the step index hits the checkpoint interval.
    pub fn step(&mut self) -> Result<StepResult, Error> {
        let Solver {
            ref mut mode,
            ref pool,
            ..
        } = *self;
        let result = match mode {
            Mode::Dynamic(integrator) => install(pool, || integrator.step())?,
            Mode::Static(s) => install(pool, || s.step())?,
        };
        let interval = self.config.checkpoint.interval;
        if let Some(store) = &self.checkpoint {
            if interval > 0 && result.step % interval == 0 {
                store.save(self.state())?;
            }
        }
        Ok(result)
    }

    /// Steps to the end of the run, calling `callback` after every step.
    ///
    /// Stops early if the callback returns `false`. Returns the number of steps taken.
    pub fn run(&mut self, mut callback: impl FnMut(&StepResult, &Solver) -> bool) -> Result<u64, Error> {
        let mut steps = 0;
        while !self.is_finished() {
            let result = self.step()?;
            steps += 1;
            if !callback(&result, self) {
                break;
            }
        }
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn cube_runs_to_completion() {
        let mut solver = SolverBuilder::new(cube_config())
            .set_mesh(make_unit_cube())
            .set_num_threads(2)
            .build()
            .unwrap();
        let mut results = Vec::new();
        let steps = solver
            .run(|res, _| {
                results.push(*res);
                true
            })
            .unwrap();
        assert_eq!(steps, 5);
        assert!(results.iter().all(|r| r.solve.converged()));
        assert_eq!(solver.phase(), Phase::Finished);
        assert_eq!(solver.state().step, 5);
        assert!(solver.step().is_err());
    }

    #[test]
    fn missing_mesh_is_a_configuration_error() {
        assert!(matches!(
            SolverBuilder::new(cube_config()).build(),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn quasi_static_solve_matches_dynamic_rest_state() {
        let mut config = cube_config();
        config.instationary.solve_instationary = false;
        let mut solver = SolverBuilder::new(config.clone())
            .set_mesh(make_box([2, 1, 1], [2.0, 1.0, 1.0]))
            .build()
            .unwrap();
        assert_eq!(solver.max_steps(), 1);
        assert!(solver.integrator().is_none());
        let result = solver.step().unwrap();
        assert!(result.solve.converged());
        assert!(solver.is_finished());

        // K u = F on the free DOFs.
        let ops = {
            let mesh = make_box([2, 1, 1], [2.0, 1.0, 1.0]);
            let params = AssemblyParams {
                material: Material::from(&config.elasticity_model),
                quadrature_order: config.quadrature_order,
                degree: 1,
                layout: config.layout(),
                kernel: config.kernel().unwrap(),
            };
            OperatorAssembler::new(&mesh, params)
                .unwrap()
                .assemble(&config.boundary_conditions().unwrap())
                .unwrap()
        };
        let mut ku = vec![0.0; ops.num_dofs()];
        crate::linalg::LinearOperator::apply(&ops.stiffness, &solver.state().u, &mut ku)
            .unwrap();
        for (i, (ku, f)) in ku.iter().zip(ops.load.iter()).enumerate() {
            if ops.dirichlet.binary_search_by_key(&i, |&(d, _)| d).is_err() {
                approx::assert_relative_eq!(ku, f, epsilon = 1e-8);
            }
        }
        // Pushing outward on the far side stretches the bar.
        let tip = solver.vertex_displacements()[2];
        assert!(tip[0] > 0.0);
    }
}
