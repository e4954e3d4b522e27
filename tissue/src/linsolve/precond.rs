//! Preconditioners built once from an explicitly formed system matrix.

mod ilu;
mod multilevel;
mod relaxation;

pub use ilu::*;
pub use multilevel::*;
pub use relaxation::*;

use thiserror::Error;

use crate::linalg::{CsrMatrix, SparseMatrix};

#[derive(Debug, Error, PartialEq)]
pub enum BuildError {
    #[error("Zero diagonal entry in row {row}")]
    ZeroDiagonal { row: usize },
    #[error("Zero pivot {pivot:e} in row {row}")]
    ZeroPivot { row: usize, pivot: f64 },
    #[error("Non-finite entry in row {row}")]
    NonFinite { row: usize },
    #[error("Invalid value {value} for parameter {name}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// Approximate inverse of a system matrix.
///
/// Preconditioners are immutable once built and may be shared between threads.
pub trait Preconditioner: Send + Sync {
    /// Computes `z = M⁻¹ r`.
    fn apply(&self, r: &[f64], z: &mut [f64]);
    fn name(&self) -> &'static str;
}

/// Preconditioner selection with all its parameters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PreconditionerKind {
    Identity,
    Jacobi,
    /// Successive over-relaxation. A relaxation factor of one gives Gauss-Seidel.
    Sor { omega: f64, symmetric: bool },
    /// Incomplete LU without fill.
    Ilu0,
    /// Incomplete LU with level of fill `level`.
    IluK { level: usize },
    /// Threshold incomplete LU.
    Ilut {
        drop_tolerance: f64,
        fill_factor: f64,
    },
    Multilevel(MultilevelParams),
}

impl PreconditionerKind {
    pub fn build(&self, matrix: &SparseMatrix) -> Result<Box<dyn Preconditioner>, BuildError> {
        let csr = matrix.to_csr();
        check_finite(&csr)?;
        let size = csr.size();
        let precond: Box<dyn Preconditioner> = match *self {
            PreconditionerKind::Identity => Box::new(Identity),
            PreconditionerKind::Jacobi => Box::new(Jacobi::new(&csr)?),
            PreconditionerKind::Sor { omega, symmetric } => {
                Box::new(Relaxation::new(csr, omega, symmetric)?)
            }
            PreconditionerKind::Ilu0 => Box::new(IncompleteLu::new(&csr, FillRule::Level(0))?),
            PreconditionerKind::IluK { level } => {
                Box::new(IncompleteLu::new(&csr, FillRule::Level(level))?)
            }
            PreconditionerKind::Ilut {
                drop_tolerance,
                fill_factor,
            } => Box::new(IncompleteLu::new(
                &csr,
                FillRule::Threshold {
                    drop_tolerance,
                    fill_factor,
                },
            )?),
            PreconditionerKind::Multilevel(params) => Box::new(MultilevelIlu::new(&csr, params)?),
        };
        log::debug!(
            "Built {} preconditioner for a system of size {}",
            precond.name(),
            size
        );
        Ok(precond)
    }
}

fn check_finite(csr: &CsrMatrix) -> Result<(), BuildError> {
    for row in 0..csr.size() {
        if csr.row_iter(row).any(|(_, v)| !v.is_finite()) {
            return Err(BuildError::NonFinite { row });
        }
    }
    Ok(())
}

/// No preconditioning.
#[derive(Copy, Clone, Debug, Default)]
pub struct Identity;

impl Preconditioner for Identity {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        z.copy_from_slice(r);
    }
    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Diagonal scaling by the inverse matrix diagonal.
#[derive(Clone, Debug)]
pub struct Jacobi {
    inv_diag: Vec<f64>,
}

impl Jacobi {
    pub fn new(csr: &CsrMatrix) -> Result<Self, BuildError> {
        let inv_diag = csr
            .diagonal()
            .into_iter()
            .enumerate()
            .map(|(row, d)| {
                if d == 0.0 {
                    Err(BuildError::ZeroDiagonal { row })
                } else {
                    Ok(1.0 / d)
                }
            })
            .collect::<Result<_, _>>()?;
        Ok(Jacobi { inv_diag })
    }
}

impl Preconditioner for Jacobi {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        for ((z, &r), &d) in z.iter_mut().zip(r.iter()).zip(self.inv_diag.iter()) {
            *z = d * r;
        }
    }
    fn name(&self) -> &'static str {
        "Jacobi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{Kernel, Layout};

    #[test]
    fn jacobi_inverts_diagonal() {
        let m = SparseMatrix::from_triplets(
            2,
            &[(0, 0, 2.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 4.0)],
            Layout::Ell,
            Kernel::Naive,
        )
        .unwrap();
        let p = PreconditionerKind::Jacobi.build(&m).unwrap();
        let mut z = [0.0; 2];
        p.apply(&[1.0, 1.0], &mut z);
        assert_eq!(z, [0.5, 0.25]);
    }

    #[test]
    fn zero_diagonal_is_a_build_error() {
        let m = SparseMatrix::from_triplets(
            2,
            &[(0, 0, 2.0), (0, 1, 1.0), (1, 0, 1.0)],
            Layout::Csr,
            Kernel::Naive,
        )
        .unwrap();
        assert_eq!(
            PreconditionerKind::Jacobi.build(&m).err(),
            Some(BuildError::ZeroDiagonal { row: 1 })
        );
        assert!(PreconditionerKind::Identity.build(&m).is_ok());
    }

    #[test]
    fn non_finite_matrices_are_rejected() {
        let m = SparseMatrix::from_triplets(
            2,
            &[(0, 0, 2.0), (1, 1, f64::NAN)],
            Layout::Csr,
            Kernel::Naive,
        )
        .unwrap();
        assert_eq!(
            PreconditionerKind::Ilu0.build(&m).err(),
            Some(BuildError::NonFinite { row: 1 })
        );
    }
}
