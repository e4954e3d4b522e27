//! Finite element discretization and time stepping of linear elastodynamics.

pub mod assembly;
pub mod dof_map;
pub mod integrator;
pub mod quadrature;
pub mod shape;
pub mod solver;
pub mod state;
pub mod time_integration;

pub use self::assembly::{AssemblyParams, Material, OperatorAssembler, Operators};
pub use self::dof_map::DofMap;
pub use self::integrator::{Damping, IntegratorParams, Phase, StepResult, TimeIntegrator};
pub use self::solver::{Solver, SolverBuilder};
pub use self::state::State;
pub use self::time_integration::{Coefficients, TimeIntegration};
