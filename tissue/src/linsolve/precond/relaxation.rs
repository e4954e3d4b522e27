use super::{BuildError, Preconditioner};
use crate::linalg::CsrMatrix;

/// Gauss-Seidel type preconditioners.
///
/// The forward variant solves `(D/ω + L) z = r`. The symmetric variant applies the SSOR matrix
/// `ω/(2 - ω) (D/ω + L) (D/ω)⁻¹ (D/ω + U)` which is symmetric positive definite whenever the
/// system matrix is and `0 < ω < 2`.
#[derive(Clone, Debug)]
pub struct Relaxation {
    matrix: CsrMatrix,
    diag: Vec<f64>,
    omega: f64,
    symmetric: bool,
}

impl Relaxation {
    pub fn new(matrix: CsrMatrix, omega: f64, symmetric: bool) -> Result<Self, BuildError> {
        if !(omega > 0.0 && omega < 2.0) {
            return Err(BuildError::InvalidParameter {
                name: "omega",
                value: omega,
            });
        }
        let diag = matrix.diagonal();
        if let Some(row) = diag.iter().position(|&d| d == 0.0) {
            return Err(BuildError::ZeroDiagonal { row });
        }
        Ok(Relaxation {
            matrix,
            diag,
            omega,
            symmetric,
        })
    }

    fn forward_sweep(&self, r: &[f64], z: &mut [f64]) {
        for i in 0..self.diag.len() {
            let mut s = r[i];
            for (j, a) in self.matrix.row_iter(i) {
                if j >= i {
                    break;
                }
                s -= a * z[j];
            }
            z[i] = self.omega * s / self.diag[i];
        }
    }

    /// Backward sweep in place: on entry `z` holds the right-hand side.
    fn backward_sweep(&self, z: &mut [f64]) {
        for i in (0..self.diag.len()).rev() {
            let mut s = z[i];
            for (j, a) in self.matrix.row_iter(i) {
                if j > i {
                    s -= a * z[j];
                }
            }
            z[i] = self.omega * s / self.diag[i];
        }
    }
}

impl Preconditioner for Relaxation {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        self.forward_sweep(r, z);
        if self.symmetric {
            let scale = (2.0 - self.omega) / (self.omega * self.omega);
            for (z, &d) in z.iter_mut().zip(self.diag.iter()) {
                *z *= scale * d;
            }
            self.backward_sweep(z);
        }
    }

    fn name(&self) -> &'static str {
        match (self.symmetric, self.omega == 1.0) {
            (false, true) => "Gauss-Seidel",
            (true, true) => "symmetric Gauss-Seidel",
            (false, false) => "SOR",
            (true, false) => "SSOR",
        }
    }
}
