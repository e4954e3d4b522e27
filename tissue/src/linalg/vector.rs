use rayon::prelude::*;
use utils::zip;

use super::Kernel;

/// Chunk length used by threaded reductions.
///
/// Partial sums are always combined in chunk order so the result does not depend on the number
/// of threads in the pool.
const REDUCTION_CHUNK: usize = 4096;

impl Kernel {
    /// Inner product of two vectors of equal length.
    pub fn dot(self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            Kernel::Naive => a.iter().zip(b.iter()).map(|(a, b)| a * b).sum(),
            Kernel::Blas => {
                let a: na::DVectorView<f64> = a.into();
                let b: na::DVectorView<f64> = b.into();
                a.dot(&b)
            }
            Kernel::Threaded => {
                let partial: Vec<f64> = a
                    .par_chunks(REDUCTION_CHUNK)
                    .zip(b.par_chunks(REDUCTION_CHUNK))
                    .map(|(a, b)| a.iter().zip(b.iter()).map(|(a, b)| a * b).sum::<f64>())
                    .collect();
                partial.into_iter().sum()
            }
        }
    }

    #[inline]
    pub fn norm_squared(self, a: &[f64]) -> f64 {
        self.dot(a, a)
    }

    /// Euclidean norm.
    #[inline]
    pub fn norm(self, a: &[f64]) -> f64 {
        self.norm_squared(a).sqrt()
    }

    /// Computes `y = alpha * x + y`.
    pub fn axpy(self, alpha: f64, x: &[f64], y: &mut [f64]) {
        debug_assert_eq!(x.len(), y.len());
        match self {
            Kernel::Naive => {
                for (y, &x) in y.iter_mut().zip(x.iter()) {
                    *y += alpha * x;
                }
            }
            Kernel::Blas => {
                let x: na::DVectorView<f64> = x.into();
                let mut y: na::DVectorViewMut<f64> = y.into();
                y.axpy(alpha, &x, 1.0);
            }
            Kernel::Threaded => {
                y.par_iter_mut()
                    .zip(x.par_iter())
                    .for_each(|(y, &x)| *y += alpha * x);
            }
        }
    }

    /// Computes `y = x + beta * y`.
    pub fn xpby(self, x: &[f64], beta: f64, y: &mut [f64]) {
        debug_assert_eq!(x.len(), y.len());
        match self {
            Kernel::Naive => {
                for (y, &x) in y.iter_mut().zip(x.iter()) {
                    *y = x + beta * *y;
                }
            }
            Kernel::Blas => {
                let x: na::DVectorView<f64> = x.into();
                let mut y: na::DVectorViewMut<f64> = y.into();
                y.axpy(1.0, &x, beta);
            }
            Kernel::Threaded => {
                y.par_iter_mut()
                    .zip(x.par_iter())
                    .for_each(|(y, &x)| *y = x + beta * *y);
            }
        }
    }

    /// Computes `z = a * x + b * y`.
    pub fn lincomb(self, a: f64, x: &[f64], b: f64, y: &[f64], z: &mut [f64]) {
        debug_assert_eq!(x.len(), y.len());
        debug_assert_eq!(x.len(), z.len());
        match self {
            Kernel::Naive | Kernel::Blas => {
                for (z, &x, &y) in zip!(z.iter_mut(), x.iter(), y.iter()) {
                    *z = a * x + b * y;
                }
            }
            Kernel::Threaded => {
                z.par_iter_mut()
                    .zip(x.par_iter().zip(y.par_iter()))
                    .for_each(|(z, (&x, &y))| *z = a * x + b * y);
            }
        }
    }

    /// Scales `x` in place.
    pub fn scale(self, alpha: f64, x: &mut [f64]) {
        match self {
            Kernel::Threaded => x.par_iter_mut().for_each(|x| *x *= alpha),
            _ => x.iter_mut().for_each(|x| *x *= alpha),
        }
    }
}

/// Returns `true` if all entries are finite.
pub fn all_finite(x: &[f64]) -> bool {
    x.iter().all(|x| x.is_finite())
}
