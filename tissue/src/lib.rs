//! Finite element elastodynamics engine for soft tissue.
//!
//! A volumetric mesh, material constants and boundary loads are assembled into mass and stiffness
//! operators once. Every time step combines them with Rayleigh damping into an effective system
//! which is solved with a preconditioned Krylov method.

pub mod boundary;
pub mod checkpoint;
pub mod config;
pub mod fem;
pub mod io;
pub mod linalg;
pub mod linsolve;
pub mod mesh;
pub mod scene;

/// Mesh and parameter fixtures shared by unit tests, integration tests and benchmarks.
pub mod test_utils;

pub use self::boundary::{BoundaryConditions, Constraint, Polarity};
pub use self::checkpoint::{CheckpointError, CheckpointStore};
pub use self::config::{Config, ConfigError};
pub use self::fem::assembly::AssemblyError;
pub use self::fem::integrator::{Phase, StepResult, TimeIntegrator};
pub use self::fem::solver::{Solver, SolverBuilder};
pub use self::fem::state::State;
pub use self::linsolve::precond::BuildError;
pub use self::mesh::{Mesh, MeshError};

use thiserror::Error;

/// Reason a Krylov iteration was declared divergent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DivergenceReason {
    /// The residual norm exceeded the configured divergence limit.
    ResidualLimit,
    /// A non-finite value appeared in the residual.
    NonFinite,
    /// The Krylov recurrence broke down, typically because the operator is singular or not
    /// positive definite.
    Breakdown,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Size mismatch: expected {expected}, found {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },
    #[error("Mesh error: {source}")]
    Mesh {
        #[from]
        source: MeshError,
    },
    #[error("Assembly error: {source}")]
    Assembly {
        #[from]
        source: AssemblyError,
    },
    #[error("Failed to build preconditioner: {source}")]
    PreconditionerBuild {
        #[from]
        source: BuildError,
    },
    #[error("Linear solver diverged after {iterations} iterations ({reason:?}, residual {residual:e})")]
    SolverDivergence {
        iterations: u32,
        residual: f64,
        reason: DivergenceReason,
    },
    #[error("Linear solver did not converge in step {step}: {result}")]
    SolverNonConvergence {
        step: u64,
        result: linsolve::SolveResult,
    },
    #[error("Checkpoint error: {source}")]
    Checkpoint {
        #[from]
        source: CheckpointError,
    },
    #[error("Simulation interrupted")]
    Interrupted,
    #[error("Invalid simulation phase: cannot {action} while {phase:?}")]
    InvalidPhase { action: &'static str, phase: Phase },
    #[error("File I/O error: {source}")]
    FileIO {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Process exit code used by front ends to distinguish failure classes.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config { .. } => 2,
            Error::Mesh { .. } => 3,
            Error::Assembly { .. } => 4,
            Error::PreconditionerBuild { .. } => 5,
            Error::SolverDivergence { .. } => 6,
            Error::SolverNonConvergence { .. } => 7,
            Error::Checkpoint { .. } => 8,
            Error::Interrupted => 130,
            Error::SizeMismatch { .. } | Error::InvalidPhase { .. } => 70,
            Error::FileIO { .. } => 74,
        }
    }
}

pub enum SimResult {
    Success(String),
    Warning(String),
    Error(String),
}

impl From<Error> for SimResult {
    fn from(err: Error) -> SimResult {
        match err {
            Error::SolverNonConvergence { step, result } => SimResult::Warning(format!(
                "Maximum iterations exceeded in step {}\n{}",
                step, result
            )),
            Error::Config { source } => {
                SimResult::Error(format!("Invalid configuration: {}", source))
            }
            Error::Mesh { source } => SimResult::Error(format!("Invalid mesh: {}", source)),
            Error::FileIO { source } => {
                SimResult::Error(format!("File I/O error: {:?}", source.kind()))
            }
            Error::Interrupted => SimResult::Warning("Simulation interrupted".to_string()),
            _ => SimResult::Error(err.to_string()),
        }
    }
}

impl From<Result<StepResult, Error>> for SimResult {
    fn from(res: Result<StepResult, Error>) -> SimResult {
        match res {
            Ok(step_result) if step_result.solve.converged() => {
                SimResult::Success(format!("{}", step_result))
            }
            Ok(step_result) => SimResult::Warning(format!("{}", step_result)),
            Err(err) => err.into(),
        }
    }
}
