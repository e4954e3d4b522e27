//! Simulation configuration.
//!
//! The configuration is a tree of plain parameter structs read from RON. Every parameter of the
//! original parameter tree must be present; only the extensions (gravity direction, Newmark
//! parameters, output and checkpoint intervals, drop tolerance and the non-convergence policy)
//! may be omitted. Unknown fields are rejected. Strategy objects (kernel, layout, time
//! integration scheme, solver and preconditioner) are derived from it once at startup.

pub mod lint;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::boundary::{BoundaryConditions, Polarity};
use crate::fem::time_integration::TimeIntegration;
use crate::linalg::{Kernel, Layout};
use crate::linsolve::precond::{MultilevelParams, PreconditionerKind, Preprocessing, Deferral};
use crate::linsolve::{Criteria, SolverKind};

pub use lint::{Level, Report};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("{path}: {message}")]
    Invalid { path: String, message: String },
    #[error("{path}: {value} is not supported by this build")]
    Unsupported { path: &'static str, value: String },
    #[error("Boundary tag {tag} is used by both Dirichlet and Neumann conditions")]
    ConflictingTag { tag: i32 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "CPU")]
    Cpu,
    #[serde(rename = "GPU")]
    Gpu,
    #[serde(rename = "OPENCL")]
    OpenCl,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Implementation {
    Naive,
    #[serde(rename = "BLAS")]
    Blas,
    #[serde(rename = "OPENMP")]
    OpenMp,
    #[serde(rename = "MKL")]
    Mkl,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatrixFormat {
    #[serde(rename = "DENSE", alias = "NAIVE")]
    Dense,
    #[serde(rename = "CSR")]
    Csr,
    #[serde(rename = "COO")]
    Coo,
    #[serde(rename = "ELL")]
    Ell,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    ImplicitEuler,
    CrankNicolson,
    ExplicitEuler,
    Newmark,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverName {
    #[serde(rename = "CG")]
    Cg,
    #[serde(rename = "GMRES")]
    Gmres,
    #[serde(rename = "CR")]
    Cr,
    #[serde(rename = "BiCGSTAB")]
    BiCgStab,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreconditionerName {
    #[serde(rename = "NOPRECOND")]
    NoPrecond,
    #[serde(rename = "JACOBI")]
    Jacobi,
    #[serde(rename = "GAUSS_SEIDEL")]
    GaussSeidel,
    #[serde(rename = "SGAUSS_SEIDEL")]
    SymmetricGaussSeidel,
    #[serde(rename = "SOR")]
    Sor,
    #[serde(rename = "SSOR")]
    Ssor,
    #[serde(rename = "ILU")]
    Ilu,
    #[serde(rename = "ILU2")]
    Ilu2,
    #[serde(rename = "ILU_P")]
    IluP,
    #[serde(rename = "ILUpp")]
    IluPp,
}

impl PreconditionerName {
    /// Returns `true` if the preconditioner is symmetric for a symmetric matrix.
    pub fn is_symmetric(self) -> bool {
        !matches!(
            self,
            PreconditionerName::GaussSeidel
                | PreconditionerName::Sor
                | PreconditionerName::Ilu2
                | PreconditionerName::IluPp
        )
    }
}

/// What to do when a time step hits the iteration cap.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonConvergencePolicy {
    /// Stop the run with an error.
    #[default]
    Abort,
    /// Accept the best iterate, log a warning and continue.
    Continue,
}

fn default_gravity_direction() -> [f64; 3] {
    [0.0, 0.0, -1.0]
}

fn default_newmark_beta() -> f64 {
    0.25
}

fn default_newmark_gamma() -> f64 {
    0.5
}

fn default_output_interval() -> u64 {
    1
}

fn default_drop_tolerance() -> f64 {
    1e-3
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeshParams {
    pub filename: PathBuf,
    pub bc_data_filename: Option<PathBuf>,
    pub initial_ref_level: u32,
}

impl Default for MeshParams {
    fn default() -> Self {
        MeshParams {
            filename: PathBuf::from("mesh.ron"),
            bc_data_filename: None,
            initial_ref_level: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearAlgebraParams {
    pub platform: Platform,
    pub implementation: Implementation,
    pub matrix_format: MatrixFormat,
}

impl Default for LinearAlgebraParams {
    fn default() -> Self {
        LinearAlgebraParams {
            platform: Platform::Cpu,
            implementation: Implementation::Naive,
            matrix_format: MatrixFormat::Csr,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElasticityParams {
    pub density: f64,
    pub lambda: f64,
    pub mu: f64,
    /// Magnitude of the gravitational acceleration.
    pub gravity: f64,
    #[serde(default = "default_gravity_direction")]
    pub gravity_direction: [f64; 3],
}

impl Default for ElasticityParams {
    fn default() -> Self {
        ElasticityParams {
            density: 1000.0,
            lambda: 28466.0,
            mu: 700.0,
            gravity: 0.0,
            gravity_direction: default_gravity_direction(),
        }
    }
}

impl ElasticityParams {
    /// Gravitational acceleration vector.
    pub fn gravity_vector(&self) -> [f64; 3] {
        let d = self.gravity_direction;
        let norm = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
        if norm == 0.0 || self.gravity == 0.0 {
            return [0.0; 3];
        }
        let s = self.gravity / norm;
        [s * d[0], s * d[1], s * d[2]]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FiniteElementParams {
    pub displacement_degree: u32,
}

impl Default for FiniteElementParams {
    fn default() -> Self {
        FiniteElementParams {
            displacement_degree: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstationaryParams {
    /// Quasi-static solve when `false`.
    pub solve_instationary: bool,
    pub damping_factor: f64,
    pub rayleigh_alpha: f64,
    pub rayleigh_beta: f64,
    pub method: Method,
    pub delta_t: f64,
    pub max_time_step_its: u64,
    #[serde(default = "default_newmark_beta")]
    pub newmark_beta: f64,
    #[serde(default = "default_newmark_gamma")]
    pub newmark_gamma: f64,
    /// Write a snapshot every this many steps. Zero disables output.
    #[serde(default = "default_output_interval")]
    pub output_interval: u64,
}

impl Default for InstationaryParams {
    fn default() -> Self {
        InstationaryParams {
            solve_instationary: true,
            damping_factor: 1.0,
            rayleigh_alpha: 0.0,
            rayleigh_beta: 0.0,
            method: Method::Newmark,
            delta_t: 0.05,
            max_time_step_its: 10,
            newmark_beta: default_newmark_beta(),
            newmark_gamma: default_newmark_gamma(),
            output_interval: default_output_interval(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirichletTag {
    pub tag: i32,
    /// Prescribed displacement, zero when omitted.
    #[serde(default)]
    pub displacement: Option<[f64; 3]>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NeumannTag {
    pub tag: i32,
    pub pressure: f64,
    #[serde(default)]
    pub polarity: Polarity,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoundaryParams {
    pub dirichlet: Vec<DirichletTag>,
    pub neumann: Vec<NeumannTag>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearSolverParams {
    pub solver_name: SolverName,
    pub maximum_iterations: u32,
    pub absolute_tolerance: f64,
    pub relative_tolerance: f64,
    pub divergence_limit: f64,
    /// Krylov basis size of restarted GMRES.
    pub basis_size: usize,
    pub preconditioning: bool,
    pub preconditioner_name: PreconditionerName,
    /// Relaxation factor of SOR and SSOR.
    pub omega: f64,
    /// Level of fill of `ILU_P`.
    pub ilu_p: usize,
    /// Relative drop tolerance of `ILU2` and `ILUpp`.
    #[serde(default = "default_drop_tolerance")]
    pub drop_tolerance: f64,
    #[serde(default)]
    pub non_convergence: NonConvergencePolicy,
}

impl Default for LinearSolverParams {
    fn default() -> Self {
        LinearSolverParams {
            solver_name: SolverName::Cg,
            maximum_iterations: 1000,
            absolute_tolerance: 1e-10,
            relative_tolerance: 1e-8,
            divergence_limit: 1e6,
            basis_size: 30,
            preconditioning: true,
            preconditioner_name: PreconditionerName::Jacobi,
            omega: 1.0,
            ilu_p: 1,
            drop_tolerance: default_drop_tolerance(),
            non_convergence: NonConvergencePolicy::Abort,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IluppParams {
    /// 0: none, 1: symmetric diagonal scaling.
    pub preprocessing_type: u32,
    /// 0: single level, 10: defer on growth, 11: defer on growth and small pivots.
    pub preconditioner_number: u32,
    pub max_multilevels: u32,
    pub mem_factor: f64,
    pub pivot_threshold: f64,
    pub min_pivot: f64,
}

impl Default for IluppParams {
    fn default() -> Self {
        IluppParams {
            preprocessing_type: 0,
            preconditioner_number: 11,
            max_multilevels: 20,
            mem_factor: 0.8,
            pivot_threshold: 2.75,
            min_pivot: 0.05,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointParams {
    /// Resume from `filename` instead of starting fresh.
    pub restore: bool,
    /// Step the restored checkpoint is required to hold.
    pub resume_step: Option<u64>,
    pub filename: PathBuf,
    /// Save every this many steps. Zero disables checkpoints.
    #[serde(default)]
    pub interval: u64,
}

impl Default for CheckpointParams {
    fn default() -> Self {
        CheckpointParams {
            restore: false,
            resume_step: None,
            filename: PathBuf::from("checkpoint.bin"),
            interval: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub output_path_and_prefix: String,
    pub mesh: MeshParams,
    pub linear_algebra: LinearAlgebraParams,
    pub elasticity_model: ElasticityParams,
    pub quadrature_order: u32,
    pub finite_elements: FiniteElementParams,
    pub instationary: InstationaryParams,
    pub boundary: BoundaryParams,
    pub linear_solver: LinearSolverParams,
    pub ilupp: IluppParams,
    pub checkpoint: CheckpointParams,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output_path_and_prefix: String::from("results/tissue"),
            mesh: MeshParams::default(),
            linear_algebra: LinearAlgebraParams::default(),
            elasticity_model: ElasticityParams::default(),
            quadrature_order: 2,
            finite_elements: FiniteElementParams::default(),
            instationary: InstationaryParams::default(),
            boundary: BoundaryParams::default(),
            linear_solver: LinearSolverParams::default(),
            ilupp: IluppParams::default(),
            checkpoint: CheckpointParams::default(),
        }
    }
}

impl Config {
    /// Parses a configuration from RON.
    ///
    /// The field structure is checked first, so a missing or misspelled field is reported with
    /// its dotted path rather than as a parse error.
    pub fn from_ron(text: &str) -> Result<Config, ConfigError> {
        let value: ron::Value = ron::de::from_str(text)?;
        if let Some(entry) = lint::lint_config_fields(&value).first_error() {
            return Err(ConfigError::Invalid {
                path: entry.path.clone(),
                message: entry.message.clone(),
            });
        }
        Ok(ron::de::from_str(text)?)
    }

    /// Runs the linter and fails with the first error it reports.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let report = lint::lint_config(self, None);
        for entry in report.entries() {
            match entry.level {
                Level::Error => {
                    return Err(ConfigError::Invalid {
                        path: entry.path.clone(),
                        message: entry.message.clone(),
                    })
                }
                Level::Warning => log::warn!("{}: {}", entry.path, entry.message),
                Level::Hint => log::debug!("{}: {}", entry.path, entry.message),
            }
        }
        Ok(())
    }

    /// Computational kernel selected by the linear algebra section.
    pub fn kernel(&self) -> Result<Kernel, ConfigError> {
        let la = &self.linear_algebra;
        match la.platform {
            Platform::Cpu => {}
            other => {
                return Err(ConfigError::Unsupported {
                    path: "linear_algebra.platform",
                    value: format!("{:?}", other),
                })
            }
        }
        match la.implementation {
            Implementation::Naive => Ok(Kernel::Naive),
            Implementation::Blas => Ok(Kernel::Blas),
            Implementation::OpenMp => Ok(Kernel::Threaded),
            Implementation::Mkl => Err(ConfigError::Unsupported {
                path: "linear_algebra.implementation",
                value: "MKL".to_string(),
            }),
        }
    }

    pub fn layout(&self) -> Layout {
        match self.linear_algebra.matrix_format {
            MatrixFormat::Dense => Layout::Dense,
            MatrixFormat::Csr => Layout::Csr,
            MatrixFormat::Coo => Layout::Coo,
            MatrixFormat::Ell => Layout::Ell,
        }
    }

    pub fn time_integration(&self) -> TimeIntegration {
        let inst = &self.instationary;
        match inst.method {
            Method::ImplicitEuler => TimeIntegration::ImplicitEuler,
            Method::CrankNicolson => TimeIntegration::CrankNicolson,
            Method::ExplicitEuler => TimeIntegration::ExplicitEuler,
            Method::Newmark => TimeIntegration::Newmark {
                beta: inst.newmark_beta,
                gamma: inst.newmark_gamma,
            },
        }
    }

    pub fn criteria(&self) -> Criteria {
        let ls = &self.linear_solver;
        Criteria {
            absolute_tolerance: ls.absolute_tolerance,
            relative_tolerance: ls.relative_tolerance,
            max_iterations: ls.maximum_iterations,
            divergence_limit: ls.divergence_limit,
        }
    }

    pub fn solver_kind(&self) -> SolverKind {
        match self.linear_solver.solver_name {
            SolverName::Cg => SolverKind::ConjugateGradient,
            SolverName::Gmres => SolverKind::Gmres {
                restart: self.linear_solver.basis_size.max(1),
            },
            SolverName::Cr => SolverKind::ConjugateResidual,
            SolverName::BiCgStab => SolverKind::BiCgStab,
        }
    }

    pub fn preconditioner_kind(&self) -> Result<PreconditionerKind, ConfigError> {
        let ls = &self.linear_solver;
        if !ls.preconditioning {
            return Ok(PreconditionerKind::Identity);
        }
        let omega = ls.omega;
        Ok(match ls.preconditioner_name {
            PreconditionerName::NoPrecond => PreconditionerKind::Identity,
            PreconditionerName::Jacobi => PreconditionerKind::Jacobi,
            PreconditionerName::GaussSeidel => PreconditionerKind::Sor {
                omega: 1.0,
                symmetric: false,
            },
            PreconditionerName::SymmetricGaussSeidel => PreconditionerKind::Sor {
                omega: 1.0,
                symmetric: true,
            },
            PreconditionerName::Sor => PreconditionerKind::Sor {
                omega,
                symmetric: false,
            },
            PreconditionerName::Ssor => PreconditionerKind::Sor {
                omega,
                symmetric: true,
            },
            PreconditionerName::Ilu => PreconditionerKind::Ilu0,
            PreconditionerName::IluP => PreconditionerKind::IluK { level: ls.ilu_p },
            PreconditionerName::Ilu2 => PreconditionerKind::Ilut {
                drop_tolerance: ls.drop_tolerance,
                fill_factor: self.ilupp.mem_factor,
            },
            PreconditionerName::IluPp => {
                PreconditionerKind::Multilevel(self.multilevel_params()?)
            }
        })
    }

    fn multilevel_params(&self) -> Result<MultilevelParams, ConfigError> {
        let p = &self.ilupp;
        let preprocessing = match p.preprocessing_type {
            0 => Preprocessing::None,
            1 => Preprocessing::DiagonalScaling,
            other => {
                return Err(ConfigError::Unsupported {
                    path: "ilupp.preprocessing_type",
                    value: other.to_string(),
                })
            }
        };
        let deferral = match p.preconditioner_number {
            0 => Deferral::Never,
            10 => Deferral::Growth,
            11 => Deferral::GrowthAndPivot,
            other => {
                return Err(ConfigError::Unsupported {
                    path: "ilupp.preconditioner_number",
                    value: other.to_string(),
                })
            }
        };
        Ok(MultilevelParams {
            preprocessing,
            deferral,
            max_levels: p.max_multilevels.max(1) as usize,
            drop_tolerance: self.linear_solver.drop_tolerance,
            fill_factor: p.mem_factor,
            pivot_threshold: p.pivot_threshold,
            min_pivot: p.min_pivot,
        })
    }

    /// Boundary conditions on face tags.
    pub fn boundary_conditions(&self) -> Result<BoundaryConditions, ConfigError> {
        let mut bcs = BoundaryConditions::new();
        for d in &self.boundary.dirichlet {
            bcs.add_dirichlet(d.tag, d.displacement.unwrap_or([0.0; 3]))?;
        }
        for n in &self.boundary.neumann {
            bcs.add_neumann(n.tag, n.pressure, n.polarity)?;
        }
        Ok(bcs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETE: &str = r#"(
        output_path_and_prefix: "out/run",
        mesh: (filename: "cube.ron", bc_data_filename: None, initial_ref_level: 0),
        linear_algebra: (platform: CPU, implementation: OPENMP, matrix_format: ELL),
        elasticity_model: (density: 1000.0, lambda: 28466.0, mu: 700.0, gravity: 0.0),
        quadrature_order: 2,
        finite_elements: (displacement_degree: 1),
        instationary: (
            solve_instationary: true,
            damping_factor: 1.0,
            rayleigh_alpha: 0.1,
            rayleigh_beta: 0.01,
            method: CrankNicolson,
            delta_t: 0.01,
            max_time_step_its: 10,
        ),
        boundary: (
            dirichlet: [(tag: 10)],
            neumann: [(tag: 11, pressure: -3.5, polarity: Inward)],
        ),
        linear_solver: (
            solver_name: GMRES,
            maximum_iterations: 1000,
            absolute_tolerance: 1e-10,
            relative_tolerance: 1e-8,
            divergence_limit: 1e6,
            basis_size: 30,
            preconditioning: true,
            preconditioner_name: SGAUSS_SEIDEL,
            omega: 1.0,
            ilu_p: 1,
        ),
        ilupp: (
            preprocessing_type: 0,
            preconditioner_number: 11,
            max_multilevels: 20,
            mem_factor: 0.8,
            pivot_threshold: 2.75,
            min_pivot: 0.05,
        ),
        checkpoint: (restore: false, filename: "checkpoint.bin"),
    )"#;

    #[test]
    fn omitted_extensions_use_defaults() {
        let config = Config::from_ron(COMPLETE).unwrap();

        assert_eq!(config.kernel().unwrap(), Kernel::Threaded);
        assert_eq!(config.layout(), Layout::Ell);
        assert_eq!(config.time_integration(), TimeIntegration::CrankNicolson);
        assert_eq!(config.elasticity_model.gravity_direction, [0.0, 0.0, -1.0]);
        assert_eq!(config.instationary.newmark_beta, 0.25);
        assert_eq!(config.instationary.newmark_gamma, 0.5);
        assert_eq!(config.instationary.output_interval, 1);
        assert_eq!(config.linear_solver.drop_tolerance, 1e-3);
        assert_eq!(config.linear_solver.non_convergence, NonConvergencePolicy::Abort);
        assert_eq!(config.checkpoint.interval, 0);
        assert_eq!(config.checkpoint.resume_step, None);
        assert_eq!(config.solver_kind(), SolverKind::Gmres { restart: 30 });
        assert_eq!(
            config.preconditioner_kind().unwrap(),
            PreconditionerKind::Sor {
                omega: 1.0,
                symmetric: true
            }
        );
        let bcs = config.boundary_conditions().unwrap();
        assert_eq!(
            bcs.get(11),
            Some(&crate::Constraint::Neumann {
                pressure: -3.5,
                polarity: Polarity::Inward
            })
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_config_is_rejected() {
        match Config::from_ron("()") {
            Err(ConfigError::Invalid { path, message }) => {
                assert_eq!(path, "output_path_and_prefix");
                assert_eq!(message, "Field does not exist");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn missing_original_parameter_is_rejected() {
        let text = COMPLETE.replace("damping_factor: 1.0,", "");
        match Config::from_ron(&text) {
            Err(ConfigError::Invalid { path, .. }) => {
                assert_eq!(path, "instationary.damping_factor")
            }
            other => panic!("unexpected result {:?}", other),
        }
        // Serde rejects the same file on its own.
        assert!(ron::de::from_str::<Config>(&text).is_err());
    }

    #[test]
    fn misspelled_field_is_rejected() {
        match Config::from_ron("(instationary: (delta_T: 0.5))") {
            Err(ConfigError::Invalid { .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }

        let text = COMPLETE.replace("delta_t: 0.01", "delta_t: 0.01, delta_T: 0.5");
        match Config::from_ron(&text) {
            Err(ConfigError::Invalid { path, message }) => {
                assert_eq!(path, "instationary.delta_T");
                assert_eq!(message, "Unknown field");
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(ron::de::from_str::<Config>(&text).is_err());
    }

    #[test]
    fn accelerators_are_rejected() {
        let mut config = Config::default();
        config.linear_algebra.platform = Platform::Gpu;
        assert!(matches!(
            config.kernel(),
            Err(ConfigError::Unsupported {
                path: "linear_algebra.platform",
                ..
            })
        ));
        config.linear_algebra.platform = Platform::Cpu;
        config.linear_algebra.implementation = Implementation::Mkl;
        assert!(config.kernel().is_err());
    }

    #[test]
    fn ilupp_selection() {
        let mut config = Config::default();
        config.linear_solver.preconditioner_name = PreconditionerName::IluPp;
        config.ilupp.preprocessing_type = 1;
        config.ilupp.preconditioner_number = 10;
        match config.preconditioner_kind().unwrap() {
            PreconditionerKind::Multilevel(params) => {
                assert_eq!(params.preprocessing, Preprocessing::DiagonalScaling);
                assert_eq!(params.deferral, Deferral::Growth);
                assert_eq!(params.max_levels, 20);
            }
            other => panic!("unexpected preconditioner {:?}", other),
        }
        config.ilupp.preconditioner_number = 7;
        assert!(config.preconditioner_kind().is_err());

        config.linear_solver.preconditioning = false;
        assert_eq!(
            config.preconditioner_kind().unwrap(),
            PreconditionerKind::Identity
        );
    }

    #[test]
    fn gravity_vector_is_normalized() {
        let params = ElasticityParams {
            gravity: 9.81,
            gravity_direction: [0.0, -2.0, 0.0],
            ..Default::default()
        };
        assert_eq!(params.gravity_vector(), [0.0, -9.81, 0.0]);
    }
}
