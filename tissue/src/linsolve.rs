//! Preconditioned Krylov solvers for the effective system of each time step.

mod bicgstab;
mod cg;
mod cr;
mod gmres;
pub mod precond;

pub use bicgstab::*;
pub use cg::*;
pub use cr::*;
pub use gmres::*;

use crate::linalg::{check_size, LinearOperator};
use crate::{DivergenceReason, Error};
use precond::Preconditioner;

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Status {
    #[error("Success")]
    Success,
    #[error("Maximum number of linear solver iterations exceeded")]
    MaximumIterationsExceeded,
    #[error("Linear solve interrupted")]
    Interrupted,
}

impl Default for Status {
    fn default() -> Self {
        Status::Success
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct SolveResult {
    /// Number of iterations of an iterative solver.
    pub iterations: u32,
    /// Absolute residual 2-norm.
    pub residual: f64,
    /// Relative residual 2-norm.
    ///
    /// Residual divided by the norm of the initial residual.
    pub error: f64,
    /// Final status of the linear solve.
    pub status: Status,
}

impl SolveResult {
    pub fn converged(&self) -> bool {
        self.status == Status::Success
    }
}

impl std::fmt::Display for SolveResult {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} after {} iterations (residual {:.3e}, relative {:.3e})",
            self.status, self.iterations, self.residual, self.error
        )
    }
}

/// Stopping criteria shared by all solvers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Criteria {
    pub absolute_tolerance: f64,
    /// Tolerance relative to the initial residual.
    pub relative_tolerance: f64,
    pub max_iterations: u32,
    /// Residual norm above which the iteration is declared divergent.
    pub divergence_limit: f64,
}

impl Default for Criteria {
    fn default() -> Self {
        Criteria {
            absolute_tolerance: 1e-10,
            relative_tolerance: 1e-8,
            max_iterations: 1000,
            divergence_limit: 1e6,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SolverKind {
    ConjugateGradient,
    /// Restarted GMRES with the given Krylov basis size.
    Gmres { restart: usize },
    ConjugateResidual,
    BiCgStab,
}

/// Tracks residual norms of one solve against the criteria.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Monitor {
    criteria: Criteria,
    initial: f64,
    target: f64,
}

impl Monitor {
    pub(crate) fn new(criteria: Criteria, initial: f64) -> Self {
        Monitor {
            criteria,
            initial,
            target: criteria
                .absolute_tolerance
                .max(criteria.relative_tolerance * initial),
        }
    }

    /// Returns `true` if the initial residual already satisfies the absolute tolerance.
    pub(crate) fn trivial(&self) -> bool {
        self.initial <= self.criteria.absolute_tolerance
    }

    #[inline]
    pub(crate) fn converged(&self, residual: f64) -> bool {
        residual <= self.target
    }

    #[inline]
    pub(crate) fn exhausted(&self, iterations: u32) -> bool {
        iterations >= self.criteria.max_iterations
    }

    /// Fails if the residual is not finite or exceeds the divergence limit.
    pub(crate) fn check(&self, iterations: u32, residual: f64) -> Result<(), Error> {
        if !residual.is_finite() {
            Err(self.diverged(iterations, residual, DivergenceReason::NonFinite))
        } else if residual > self.criteria.divergence_limit {
            Err(self.diverged(iterations, residual, DivergenceReason::ResidualLimit))
        } else {
            Ok(())
        }
    }

    pub(crate) fn breakdown(&self, iterations: u32, residual: f64, value: f64) -> Error {
        if value.is_finite() {
            self.diverged(iterations, residual, DivergenceReason::Breakdown)
        } else {
            self.diverged(iterations, residual, DivergenceReason::NonFinite)
        }
    }

    fn diverged(&self, iterations: u32, residual: f64, reason: DivergenceReason) -> Error {
        log::debug!(
            "Linear solver diverged after {} iterations: {:?} (residual {:e})",
            iterations,
            reason,
            residual
        );
        Error::SolverDivergence {
            iterations,
            residual,
            reason,
        }
    }

    pub(crate) fn result(&self, iterations: u32, residual: f64, status: Status) -> SolveResult {
        SolveResult {
            iterations,
            residual,
            error: if self.initial > 0.0 {
                residual / self.initial
            } else {
                0.0
            },
            status,
        }
    }
}

/// Computes `r = b - A x`.
pub(crate) fn residual<A: LinearOperator + ?Sized>(
    a: &A,
    b: &[f64],
    x: &[f64],
    r: &mut [f64],
) -> Result<(), Error> {
    r.copy_from_slice(b);
    a.apply_scaled(-1.0, x, 1.0, r)
}

/// Solver selected once from the configuration and reused for every solve.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LinearSolver {
    kind: SolverKind,
    criteria: Criteria,
}

impl LinearSolver {
    pub fn new(kind: SolverKind, criteria: Criteria) -> Self {
        LinearSolver { kind, criteria }
    }

    pub fn kind(&self) -> SolverKind {
        self.kind
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// Solves `A x = b` starting from the initial guess in `x`.
    ///
    /// `interrupted` is polled between iterations; once it returns `true` the solve stops with
    /// [`Status::Interrupted`] leaving the current iterate in `x`.
    pub fn solve<A: LinearOperator + ?Sized>(
        &self,
        a: &A,
        b: &[f64],
        x: &mut [f64],
        precond: &dyn Preconditioner,
        interrupted: &mut dyn FnMut() -> bool,
    ) -> Result<SolveResult, Error> {
        let n = a.size();
        check_size(n, b.len())?;
        check_size(n, x.len())?;
        let result = match self.kind {
            SolverKind::ConjugateGradient => {
                ConjugateGradient::new(n).solve(a, b, x, precond, &self.criteria, interrupted)
            }
            SolverKind::Gmres { restart } => {
                Gmres::new(n, restart).solve(a, b, x, precond, &self.criteria, interrupted)
            }
            SolverKind::ConjugateResidual => {
                ConjugateResidual::new(n).solve(a, b, x, precond, &self.criteria, interrupted)
            }
            SolverKind::BiCgStab => {
                BiCgStab::new(n).solve(a, b, x, precond, &self.criteria, interrupted)
            }
        }?;
        log::debug!("{:?}: {}", self.kind, result);
        Ok(result)
    }
}
