//! In-memory linear algebra containers.
//!
//! Matrices are accumulated from triplets during assembly and then finalized into one of several
//! storage layouts. Matrix-vector products and vector reductions are dispatched on a [`Kernel`]
//! chosen once at startup, so callers never need to know which concrete backend executes.

mod combination;
mod coo;
mod csr;
mod ell;
mod matrix;
mod vector;

pub use combination::*;
pub use coo::*;
pub use csr::*;
pub use ell::*;
pub use matrix::*;
pub use vector::*;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Storage layout of a finalized matrix.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layout {
    /// Column-major dense storage.
    Dense,
    /// Compressed sparse rows.
    Csr,
    /// Coordinate (triplet) storage sorted by row.
    Coo,
    /// ELLPACK storage with rows padded to the widest row.
    Ell,
}

impl Default for Layout {
    fn default() -> Self {
        Layout::Csr
    }
}

/// Computational kernel used for products and reductions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kernel {
    /// Plain serial loops.
    Naive,
    /// Serial vectorized routines provided by `nalgebra`.
    Blas,
    /// Multi-threaded routines running on the global `rayon` pool.
    Threaded,
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::Naive
    }
}

/// A square linear map `y = A x`.
///
/// This is the only capability iterative solvers need from a system matrix.
pub trait LinearOperator {
    /// Number of rows (and columns) of the operator.
    fn size(&self) -> usize;

    /// Computes `y = beta * y + alpha * A x`.
    ///
    /// When `beta` is zero, `y` is overwritten and its previous contents are ignored even if
    /// they are not finite.
    fn apply_scaled(&self, alpha: f64, x: &[f64], beta: f64, y: &mut [f64]) -> Result<(), Error>;

    /// Computes `y = A x`.
    fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<(), Error> {
        self.apply_scaled(1.0, x, 0.0, y)
    }

    /// Kernel used for vector reductions alongside this operator.
    fn kernel(&self) -> Kernel;
}

/// Verifies that a vector has the expected length.
#[inline]
pub(crate) fn check_size(expected: usize, actual: usize) -> Result<(), Error> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::SizeMismatch { expected, actual })
    }
}

/// Computes `y = beta * y + alpha * value` treating a zero `beta` as an overwrite.
#[inline]
pub(crate) fn blend(y: &mut f64, alpha: f64, value: f64, beta: f64) {
    if beta == 0.0 {
        *y = alpha * value;
    } else {
        *y = beta * *y + alpha * value;
    }
}
