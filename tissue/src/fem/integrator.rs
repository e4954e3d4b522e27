//! Time stepping of the assembled system.
//!
//! The integrator owns the assembled operators and the solution state. Every step forms the
//! effective operator as a lazy combination of mass and stiffness, so a change of the time step
//! only changes scalar weights. The preconditioner is built from the explicitly formed effective
//! matrix on first use and kept until those weights change.

use lazycell::LazyCell;
use utils::zip;

use crate::config::{ConfigError, NonConvergencePolicy};
use crate::fem::assembly::Operators;
use crate::fem::state::State;
use crate::fem::time_integration::{Coefficients, TimeIntegration};
use crate::linalg::{LinearCombination, LinearOperator};
use crate::linsolve::precond::{Preconditioner, PreconditionerKind};
use crate::linsolve::{LinearSolver, SolveResult, Status};
use crate::Error;

/// Phase of the time stepping state machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Fresh state with a consistent initial acceleration.
    Initialized,
    /// A step is being computed.
    Stepping,
    /// The last step was accepted.
    ConvergedStep,
    /// The last step failed. No further steps are taken.
    Diverged,
    /// All configured steps are done.
    Finished,
    /// The state was replaced from a checkpoint.
    Restored,
}

/// Rayleigh damping `C = factor * (alpha * M + beta * K)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Damping {
    pub factor: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl Default for Damping {
    fn default() -> Self {
        Damping {
            factor: 1.0,
            alpha: 0.0,
            beta: 0.0,
        }
    }
}

impl Damping {
    /// Weight of the mass matrix in `C`.
    pub fn mass_weight(&self) -> f64 {
        self.factor * self.alpha
    }
    /// Weight of the stiffness matrix in `C`.
    pub fn stiffness_weight(&self) -> f64 {
        self.factor * self.beta
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntegratorParams {
    pub scheme: TimeIntegration,
    pub time_step: f64,
    /// Index of the last step. Restored runs continue up to this step.
    pub max_steps: u64,
    pub damping: Damping,
    pub solver: LinearSolver,
    pub preconditioner: PreconditionerKind,
    pub non_convergence: NonConvergencePolicy,
}

/// Outcome of a single accepted time step.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StepResult {
    /// Index of the completed step, starting at one.
    pub step: u64,
    /// Time at the end of the step.
    pub time: f64,
    pub solve: SolveResult,
}

impl std::fmt::Display for StepResult {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Step {} (t = {}): {}", self.step, self.time, self.solve)
    }
}

pub struct TimeIntegrator {
    operators: Operators,
    params: IntegratorParams,
    /// Increment form coefficients. `None` for the explicit scheme.
    coefficients: Option<Coefficients>,
    preconditioner: LazyCell<Box<dyn Preconditioner>>,
    preconditioner_builds: usize,
    /// Step and time at which the current time step size took effect.
    origin: (u64, f64),
    state: State,
    phase: Phase,
    interrupter: Box<dyn FnMut() -> bool + Send>,
    rhs: Vec<f64>,
    /// Unknown of the linear solve: the displacement increment or the new acceleration.
    x: Vec<f64>,
    work: [Vec<f64>; 2],
}

fn check_time_step(dt: f64) -> Result<(), ConfigError> {
    if dt.is_finite() && dt > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            path: "instationary.delta_t".to_string(),
            message: format!("Time step must be positive, found {}", dt),
        })
    }
}

impl TimeIntegrator {
    /// Creates an integrator at rest and solves for the consistent initial acceleration
    /// `M a = F - K u - C v`.
    ///
    /// Constrained DOFs start at their prescribed displacement.
    pub fn new(operators: Operators, params: IntegratorParams) -> Result<Self, Error> {
        check_time_step(params.time_step)?;
        if let Some((beta, gamma)) = params.scheme.newmark_parameters() {
            if !(beta > 0.0) || !(gamma >= 0.0) {
                return Err(ConfigError::Invalid {
                    path: "instationary.newmark_beta".to_string(),
                    message: format!(
                        "Newmark parameters must satisfy beta > 0 and gamma >= 0, found ({}, {})",
                        beta, gamma
                    ),
                }
                .into());
            }
        }

        let n = operators.num_dofs();
        let mut state = State::zeros(n);
        operators.set_constrained(&mut state.u, |g| g);

        let mut integrator = TimeIntegrator {
            coefficients: params.scheme.coefficients(params.time_step),
            operators,
            params,
            preconditioner: LazyCell::new(),
            preconditioner_builds: 0,
            origin: (0, 0.0),
            state,
            phase: Phase::Initialized,
            interrupter: Box::new(|| false),
            rhs: vec![0.0; n],
            x: vec![0.0; n],
            work: [vec![0.0; n], vec![0.0; n]],
        };
        integrator.initialize()?;
        Ok(integrator)
    }

    fn initialize(&mut self) -> Result<(), Error> {
        let TimeIntegrator {
            ref operators,
            ref params,
            ref mut state,
            ref mut rhs,
            ref mut interrupter,
            ..
        } = *self;
        // F - K u. The initial velocity is zero.
        rhs.copy_from_slice(&operators.load);
        operators
            .stiffness
            .apply_scaled(-1.0, &state.u, 1.0, rhs)?;
        operators.set_constrained(rhs, |_| 0.0);

        let precond = params.preconditioner.build(&operators.mass)?;
        let result = params.solver.solve(
            &operators.mass,
            rhs,
            &mut state.a,
            precond.as_ref(),
            &mut **interrupter,
        )?;
        match result.status {
            Status::Success => {}
            Status::Interrupted => return Err(Error::Interrupted),
            Status::MaximumIterationsExceeded => match params.non_convergence {
                NonConvergencePolicy::Abort => {
                    return Err(Error::SolverNonConvergence { step: 0, result })
                }
                NonConvergencePolicy::Continue => {
                    log::warn!("Initial acceleration did not converge: {}", result)
                }
            },
        }
        log::debug!("Initial acceleration: {}", result);
        Ok(())
    }

    /// Sets the function polled between solver iterations. Once it returns `true` the current
    /// step is abandoned with [`Error::Interrupted`] and the state is left untouched.
    pub fn set_interrupter(&mut self, interrupted: impl FnMut() -> bool + Send + 'static) {
        self.interrupter = Box::new(interrupted);
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn operators(&self) -> &Operators {
        &self.operators
    }

    pub fn scheme(&self) -> TimeIntegration {
        self.params.scheme
    }

    pub fn time_step(&self) -> f64 {
        self.params.time_step
    }

    pub fn max_steps(&self) -> u64 {
        self.params.max_steps
    }

    /// Time at the end of the last step at the current time step size.
    pub fn end_time(&self) -> f64 {
        let (step, time) = self.origin;
        time + self.params.max_steps.saturating_sub(step) as f64 * self.params.time_step
    }

    pub fn is_finished(&self) -> bool {
        self.state.step >= self.params.max_steps
    }

    /// Number of times the effective preconditioner was built.
    pub fn preconditioner_builds(&self) -> usize {
        self.preconditioner_builds
    }

    /// Weights of `M` and `K` in the effective operator.
    pub fn operator_weights(&self) -> (f64, f64) {
        match self.coefficients {
            Some(c) => (
                c.a0 + c.a1 * self.params.damping.mass_weight(),
                1.0 + c.a1 * self.params.damping.stiffness_weight(),
            ),
            None => (1.0, 0.0),
        }
    }

    /// Changes the time step size for subsequent steps.
    ///
    /// The effective preconditioner is rebuilt on the next step if its weights change.
    pub fn set_time_step(&mut self, dt: f64) -> Result<(), Error> {
        check_time_step(dt)?;
        if dt == self.params.time_step {
            return Ok(());
        }
        let weights = self.operator_weights();
        self.origin = (self.state.step, self.state.time);
        self.params.time_step = dt;
        self.coefficients = self.params.scheme.coefficients(dt);
        if self.operator_weights() != weights {
            self.preconditioner = LazyCell::new();
        }
        log::debug!("Time step changed to {} at step {}", dt, self.state.step);
        Ok(())
    }

    /// Replaces the state wholesale, typically from a checkpoint.
    ///
    /// Fails without touching the current state if the sizes disagree.
    pub fn restore(&mut self, state: State) -> Result<(), Error> {
        if self.phase == Phase::Stepping {
            return Err(Error::InvalidPhase {
                action: "restore",
                phase: self.phase,
            });
        }
        state.check_size(self.operators.num_dofs())?;
        log::info!("Restored state at step {} (t = {})", state.step, state.time);
        self.origin = (state.step, state.time);
        self.state = state;
        self.phase = Phase::Restored;
        Ok(())
    }

    /// Advances the state by one time step.
    pub fn step(&mut self) -> Result<StepResult, Error> {
        if self.is_finished() && self.phase != Phase::Diverged {
            self.phase = Phase::Finished;
        }
        let previous = self.phase;
        if matches!(previous, Phase::Diverged | Phase::Finished | Phase::Stepping) {
            return Err(Error::InvalidPhase {
                action: "step",
                phase: previous,
            });
        }
        self.phase = Phase::Stepping;

        let solve = if self.params.scheme.is_explicit() {
            self.explicit_solve()
        } else {
            self.implicit_solve()
        };

        let result = solve.and_then(|result| match result.status {
            Status::Success => Ok(result),
            Status::Interrupted => Err(Error::Interrupted),
            Status::MaximumIterationsExceeded => match self.params.non_convergence {
                NonConvergencePolicy::Abort => Err(Error::SolverNonConvergence {
                    step: self.state.step + 1,
                    result,
                }),
                NonConvergencePolicy::Continue => {
                    log::warn!(
                        "Step {} did not converge, continuing with the last iterate: {}",
                        self.state.step + 1,
                        result
                    );
                    Ok(result)
                }
            },
        });

        match result {
            Ok(solve) => {
                self.commit();
                self.phase = if self.is_finished() {
                    Phase::Finished
                } else {
                    Phase::ConvergedStep
                };
                let step_result = StepResult {
                    step: self.state.step,
                    time: self.state.time,
                    solve,
                };
                log::debug!("{}", step_result);
                Ok(step_result)
            }
            Err(Error::Interrupted) => {
                self.phase = previous;
                Err(Error::Interrupted)
            }
            Err(err) => {
                log::error!("Step {} failed: {}", self.state.step + 1, err);
                self.phase = Phase::Diverged;
                Err(err)
            }
        }
    }

    /// Steps until the last configured step, calling `callback` after every step.
    ///
    /// Stops early if the callback returns `false`. Returns the number of steps taken.
    pub fn run(
        &mut self,
        mut callback: impl FnMut(&StepResult, &State) -> bool,
    ) -> Result<u64, Error> {
        let mut steps = 0;
        while !self.is_finished() {
            let result = self.step()?;
            steps += 1;
            if !callback(&result, &self.state) {
                break;
            }
        }
        Ok(steps)
    }

    /// Solves for the displacement increment of an implicit step.
    fn implicit_solve(&mut self) -> Result<SolveResult, Error> {
        let (mass_weight, stiffness_weight) = self.operator_weights();
        let TimeIntegrator {
            ref operators,
            ref params,
            coefficients,
            ref preconditioner,
            ref mut preconditioner_builds,
            ref state,
            ref mut interrupter,
            ref mut rhs,
            ref mut x,
            ref mut work,
            ..
        } = *self;
        let Coefficients {
            a0: _,
            a1: _,
            a2,
            a3,
            a4,
            a5,
        } = coefficients.ok_or(Error::InvalidPhase {
            action: "take an implicit step",
            phase: Phase::Stepping,
        })?;
        let Operators {
            ref mass,
            ref stiffness,
            ref load,
            ..
        } = *operators;
        let k = stiffness.kernel();
        let [damped, inertial] = work;

        // F - K u + M (a2 v + a3 a) + C (a4 v + a5 a)
        k.lincomb(a4, &state.v, a5, &state.a, damped);
        k.lincomb(a2, &state.v, a3, &state.a, inertial);
        k.axpy(params.damping.mass_weight(), damped, inertial);
        k.scale(params.damping.stiffness_weight(), damped);
        k.axpy(-1.0, &state.u, damped);
        rhs.copy_from_slice(load);
        mass.apply_scaled(1.0, inertial, 1.0, rhs)?;
        stiffness.apply_scaled(1.0, damped, 1.0, rhs)?;
        operators.set_constrained(rhs, |_| 0.0);

        let effective = LinearCombination::new([(mass_weight, mass), (stiffness_weight, stiffness)])?;
        let precond = preconditioner.try_borrow_with(|| {
            *preconditioner_builds += 1;
            let matrix = effective.to_matrix()?;
            Ok::<_, Error>(params.preconditioner.build(&matrix)?)
        })?;

        x.iter_mut().for_each(|x| *x = 0.0);
        params
            .solver
            .solve(&effective, rhs, x, precond.as_ref(), &mut **interrupter)
    }

    /// Predicts displacement and velocity and solves `M a = F - K u - C v` for the new
    /// acceleration.
    fn explicit_solve(&mut self) -> Result<SolveResult, Error> {
        let TimeIntegrator {
            ref operators,
            ref params,
            ref preconditioner,
            ref mut preconditioner_builds,
            ref state,
            ref mut interrupter,
            ref mut rhs,
            ref mut x,
            ref mut work,
            ..
        } = *self;
        let Operators {
            ref mass,
            ref stiffness,
            ref load,
            ..
        } = *operators;
        let dt = params.time_step;
        let k = mass.kernel();
        let [u_next, v_next] = work;

        k.lincomb(1.0, &state.u, dt, &state.v, u_next);
        k.lincomb(1.0, &state.v, dt, &state.a, v_next);
        rhs.copy_from_slice(load);
        stiffness.apply_scaled(-1.0, u_next, 1.0, rhs)?;
        stiffness.apply_scaled(-params.damping.stiffness_weight(), v_next, 1.0, rhs)?;
        mass.apply_scaled(-params.damping.mass_weight(), v_next, 1.0, rhs)?;
        operators.set_constrained(rhs, |_| 0.0);

        let precond = preconditioner.try_borrow_with(|| {
            *preconditioner_builds += 1;
            params.preconditioner.build(mass)
        })?;

        x.copy_from_slice(&state.a);
        params
            .solver
            .solve(mass, rhs, x, precond.as_ref(), &mut **interrupter)
    }

    /// Applies the solved unknown to the state and advances the clock.
    fn commit(&mut self) {
        let TimeIntegrator {
            ref operators,
            coefficients,
            ref mut state,
            ref x,
            ref work,
            ..
        } = *self;
        match coefficients {
            Some(c) => {
                for (u, v, a, &du) in zip!(
                    state.u.iter_mut(),
                    state.v.iter_mut(),
                    state.a.iter_mut(),
                    x.iter()
                ) {
                    let (v_prev, a_prev) = (*v, *a);
                    *a = c.a0 * du - c.a2 * v_prev - c.a3 * a_prev;
                    *v = c.a1 * du - c.a4 * v_prev - c.a5 * a_prev;
                    *u += du;
                }
            }
            None => {
                state.u.copy_from_slice(&work[0]);
                state.v.copy_from_slice(&work[1]);
                state.a.copy_from_slice(x);
            }
        }
        operators.set_constrained(&mut state.v, |_| 0.0);
        operators.set_constrained(&mut state.a, |_| 0.0);

        state.step += 1;
        let (step, time) = self.origin;
        state.time = time + (state.step - step) as f64 * self.params.time_step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryConditions;
    use crate::fem::assembly::{AssemblyParams, Material, OperatorAssembler};
    use crate::linalg::{Kernel, Layout};
    use crate::linsolve::{Criteria, SolverKind};
    use crate::test_utils::*;
    use approx::assert_relative_eq;

    fn operators(bcs: &BoundaryConditions) -> Operators {
        let mesh = make_box([2, 1, 1], [2.0, 1.0, 1.0]);
        let params = AssemblyParams {
            material: Material::from(&soft_material()),
            quadrature_order: 2,
            degree: 1,
            layout: Layout::Csr,
            kernel: Kernel::Naive,
        };
        OperatorAssembler::new(&mesh, params)
            .unwrap()
            .assemble(bcs)
            .unwrap()
    }

    fn params(scheme: TimeIntegration, max_steps: u64) -> IntegratorParams {
        IntegratorParams {
            scheme,
            time_step: 0.1,
            max_steps,
            damping: Damping::default(),
            solver: LinearSolver::new(
                SolverKind::ConjugateGradient,
                Criteria {
                    absolute_tolerance: 1e-14,
                    relative_tolerance: 1e-12,
                    ..Default::default()
                },
            ),
            preconditioner: PreconditionerKind::Jacobi,
            non_convergence: NonConvergencePolicy::Abort,
        }
    }

    #[test]
    fn step_count_and_end_time() {
        let ops = operators(&clamp_and_push(1.0));
        let mut integrator =
            TimeIntegrator::new(ops, params(TimeIntegration::default(), 25)).unwrap();
        assert_eq!(integrator.phase(), Phase::Initialized);
        let mut steps = 0;
        let taken = integrator
            .run(|result, _| {
                steps += 1;
                assert_eq!(result.step, steps);
                true
            })
            .unwrap();
        assert_eq!(taken, 25);
        assert_eq!(integrator.phase(), Phase::Finished);
        assert_relative_eq!(integrator.state().time, 2.5);
        assert_relative_eq!(integrator.end_time(), 2.5);
        assert_eq!(integrator.preconditioner_builds(), 1);
        assert!(matches!(
            integrator.step(),
            Err(Error::InvalidPhase {
                phase: Phase::Finished,
                ..
            })
        ));
    }

    #[test]
    fn constrained_dofs_follow_prescribed_values() {
        let mut bcs = BoundaryConditions::new();
        bcs.add_dirichlet(FIXED_TAG, [0.0, 0.0, 0.05]).unwrap();
        let ops = operators(&bcs);
        let dirichlet = ops.dirichlet.clone();
        for scheme in [
            TimeIntegration::ImplicitEuler,
            TimeIntegration::CrankNicolson,
            TimeIntegration::ExplicitEuler,
        ] {
            let mut integrator = TimeIntegrator::new(ops.clone(), params(scheme, 3)).unwrap();
            integrator.run(|_, _| true).unwrap();
            let state = integrator.state();
            for &(dof, g) in &dirichlet {
                assert_eq!(state.u[dof], g);
                assert_eq!(state.v[dof], 0.0);
                assert_eq!(state.a[dof], 0.0);
            }
            // The prescribed lift drags the free end along.
            assert!(state.u.iter().skip(2).step_by(3).any(|&u| u > 0.0 && u < 0.05));
        }
    }

    #[test]
    fn initial_acceleration_balances_the_load() {
        let ops = operators(&clamp_and_push(3.0));
        let integrator = TimeIntegrator::new(ops, params(TimeIntegration::default(), 1)).unwrap();
        let ops = integrator.operators();
        let mut ma = vec![0.0; ops.num_dofs()];
        ops.mass.apply(&integrator.state().a, &mut ma).unwrap();
        for (i, (ma, f)) in ma.iter().zip(ops.load.iter()).enumerate() {
            if ops.dirichlet.binary_search_by_key(&i, |&(d, _)| d).is_err() {
                assert_relative_eq!(ma, f, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn time_step_change_rebuilds_preconditioner() {
        let ops = operators(&clamp_and_push(1.0));
        let mut integrator =
            TimeIntegrator::new(ops, params(TimeIntegration::ImplicitEuler, 10)).unwrap();
        integrator.step().unwrap();
        integrator.step().unwrap();
        assert_eq!(integrator.preconditioner_builds(), 1);
        integrator.set_time_step(0.05).unwrap();
        integrator.step().unwrap();
        assert_eq!(integrator.preconditioner_builds(), 2);
        assert_relative_eq!(integrator.state().time, 0.25);
        assert!(integrator.set_time_step(0.0).is_err());
    }

    #[test]
    fn undamped_newmark_conserves_energy() {
        // Free vibration after a prescribed initial velocity.
        let ops = operators(&clamp_and_push(0.0));
        let n = ops.num_dofs();
        let energy = |state: &State, ops: &Operators| {
            let mut mv = vec![0.0; n];
            let mut ku = vec![0.0; n];
            ops.mass.apply(&state.v, &mut mv).unwrap();
            ops.stiffness.apply(&state.u, &mut ku).unwrap();
            let kinetic: f64 = mv.iter().zip(state.v.iter()).map(|(a, b)| a * b).sum();
            let potential: f64 = ku.iter().zip(state.u.iter()).map(|(a, b)| a * b).sum();
            0.5 * (kinetic + potential)
        };
        let mut integrator =
            TimeIntegrator::new(ops.clone(), params(TimeIntegration::CrankNicolson, 20)).unwrap();
        let mut state = integrator.state().clone();
        state.v = (0..n).map(|i| if i % 3 == 2 { 0.1 } else { 0.0 }).collect();
        ops.set_constrained(&mut state.v, |_| 0.0);
        integrator.restore(state).unwrap();
        assert_eq!(integrator.phase(), Phase::Restored);
        let e0 = energy(integrator.state(), &ops);
        integrator.run(|_, _| true).unwrap();
        assert_relative_eq!(energy(integrator.state(), &ops), e0, max_relative = 1e-8);
    }

    #[test]
    fn restore_with_wrong_size_keeps_state() {
        let ops = operators(&clamp_and_push(1.0));
        let mut integrator =
            TimeIntegrator::new(ops, params(TimeIntegration::default(), 5)).unwrap();
        integrator.step().unwrap();
        let before = integrator.state().clone();
        assert!(matches!(
            integrator.restore(State::zeros(3)),
            Err(Error::SizeMismatch { .. })
        ));
        assert_eq!(integrator.state(), &before);
        assert_eq!(integrator.phase(), Phase::ConvergedStep);
    }

    #[test]
    fn interrupted_step_leaves_state_untouched() {
        let ops = operators(&clamp_and_push(1.0));
        let mut integrator =
            TimeIntegrator::new(ops, params(TimeIntegration::default(), 5)).unwrap();
        integrator.set_interrupter(|| true);
        let before = integrator.state().clone();
        assert!(matches!(integrator.step(), Err(Error::Interrupted)));
        assert_eq!(integrator.state(), &before);
        assert_eq!(integrator.phase(), Phase::Initialized);
    }

    #[test]
    fn non_convergence_policy() {
        let ops = operators(&clamp_and_push(1.0));
        let mut p = params(TimeIntegration::default(), 5);
        p.solver = LinearSolver::new(
            SolverKind::ConjugateGradient,
            Criteria {
                absolute_tolerance: 1e-16,
                relative_tolerance: 1e-16,
                max_iterations: 1,
                ..Default::default()
            },
        );
        p.preconditioner = PreconditionerKind::Identity;
        p.non_convergence = NonConvergencePolicy::Continue;
        let mut integrator = TimeIntegrator::new(ops.clone(), p).unwrap();
        let result = integrator.step().unwrap();
        assert_eq!(result.solve.status, Status::MaximumIterationsExceeded);
        assert_eq!(integrator.state().step, 1);

        p.non_convergence = NonConvergencePolicy::Abort;
        assert!(matches!(
            TimeIntegrator::new(ops, p),
            Err(Error::SolverNonConvergence { step: 0, .. })
        ));
    }
}
