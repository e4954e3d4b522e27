use super::precond::Preconditioner;
use super::{residual, Criteria, Monitor, SolveResult, Status};
use crate::linalg::LinearOperator;
use crate::Error;

/// Restarted right-preconditioned GMRES.
///
/// Minimizes the residual over a Krylov space of `A M⁻¹` built with modified Gram-Schmidt.
/// The Hessenberg matrix is reduced to triangular form with Givens rotations as columns are
/// added, so the residual norm of the current iterate is known without forming it. At each
/// restart the true residual is recomputed.
pub struct Gmres {
    restart: usize,
    /// Orthonormal Krylov basis.
    basis: Vec<Vec<f64>>,
    /// Columns of the rotated Hessenberg matrix.
    hessenberg: Vec<Vec<f64>>,
    rotations: Vec<(f64, f64)>,
    /// Rotated residual vector `β e₁`.
    g: Vec<f64>,
    r: Vec<f64>,
    w: Vec<f64>,
    z: Vec<f64>,
}

/// Rotation `(c, s)` zeroing `b` in `(a, b)`, together with the resulting norm.
fn givens(a: f64, b: f64) -> (f64, f64, f64) {
    let d = a.hypot(b);
    if d == 0.0 {
        (1.0, 0.0, 0.0)
    } else {
        (a / d, b / d, d)
    }
}

impl Gmres {
    pub fn new(size: usize, restart: usize) -> Self {
        let restart = restart.max(1);
        Gmres {
            restart,
            basis: vec![vec![0.0; size]; restart + 1],
            hessenberg: vec![vec![0.0; restart + 1]; restart],
            rotations: vec![(1.0, 0.0); restart],
            g: vec![0.0; restart + 1],
            r: vec![0.0; size],
            w: vec![0.0; size],
            z: vec![0.0; size],
        }
    }

    /// Adds the correction `M⁻¹ V y` of the first `k` basis vectors to `x`.
    fn update(&mut self, k: usize, x: &mut [f64], precond: &dyn Preconditioner) -> Result<(), f64> {
        let Gmres {
            ref basis,
            ref hessenberg,
            ref g,
            ref mut w,
            ref mut z,
            ..
        } = *self;
        if k == 0 {
            return Ok(());
        }
        // Back substitution with the triangular part of the rotated Hessenberg matrix.
        let mut y = vec![0.0; k];
        for i in (0..k).rev() {
            let s: f64 = (i + 1..k).map(|j| hessenberg[j][i] * y[j]).sum();
            let d = hessenberg[i][i];
            if d == 0.0 || !d.is_finite() {
                return Err(d);
            }
            y[i] = (g[i] - s) / d;
        }
        w.iter_mut().for_each(|w| *w = 0.0);
        for (v, &y) in basis.iter().zip(y.iter()) {
            for (w, &v) in w.iter_mut().zip(v.iter()) {
                *w += y * v;
            }
        }
        precond.apply(w, z);
        for (x, &z) in x.iter_mut().zip(z.iter()) {
            *x += z;
        }
        Ok(())
    }

    pub fn solve<A: LinearOperator + ?Sized>(
        &mut self,
        a: &A,
        b: &[f64],
        x: &mut [f64],
        precond: &dyn Preconditioner,
        criteria: &Criteria,
        interrupted: &mut dyn FnMut() -> bool,
    ) -> Result<SolveResult, Error> {
        let k = a.kernel();
        let m = self.restart;

        residual(a, b, x, &mut self.r)?;
        let mut beta = k.norm(&self.r);
        let monitor = Monitor::new(*criteria, beta);
        monitor.check(0, beta)?;
        if monitor.trivial() {
            return Ok(monitor.result(0, beta, Status::Success));
        }

        let mut iterations = 0;
        loop {
            // Start a new cycle from the true residual.
            self.basis[0].copy_from_slice(&self.r);
            k.scale(1.0 / beta, &mut self.basis[0]);
            self.g.iter_mut().for_each(|g| *g = 0.0);
            self.g[0] = beta;

            let mut estimate = beta;
            let mut cols = 0;
            let mut stop = None;
            for j in 0..m {
                if monitor.exhausted(iterations) {
                    stop = Some(Status::MaximumIterationsExceeded);
                    break;
                }
                if interrupted() {
                    stop = Some(Status::Interrupted);
                    break;
                }

                // w = A M⁻¹ v_j
                precond.apply(&self.basis[j], &mut self.z);
                a.apply(&self.z, &mut self.w)?;

                let h = &mut self.hessenberg[j];
                for i in 0..=j {
                    h[i] = k.dot(&self.w, &self.basis[i]);
                    k.axpy(-h[i], &self.basis[i], &mut self.w);
                }
                let h_next = k.norm(&self.w);
                h[j + 1] = h_next;

                for i in 0..j {
                    let (c, s) = self.rotations[i];
                    let (hi, hn) = (h[i], h[i + 1]);
                    h[i] = c * hi + s * hn;
                    h[i + 1] = -s * hi + c * hn;
                }
                let (c, s, d) = givens(h[j], h[j + 1]);
                if d == 0.0 || !d.is_finite() {
                    return Err(monitor.breakdown(iterations, estimate, d));
                }
                self.rotations[j] = (c, s);
                h[j] = d;
                h[j + 1] = 0.0;
                self.g[j + 1] = -s * self.g[j];
                self.g[j] *= c;

                iterations += 1;
                cols = j + 1;
                estimate = self.g[j + 1].abs();
                log::trace!("GMRES iteration {}: residual estimate {:e}", iterations, estimate);
                monitor.check(iterations, estimate)?;

                if monitor.converged(estimate) || h_next == 0.0 {
                    break;
                }
                let next = &mut self.basis[j + 1];
                next.copy_from_slice(&self.w);
                k.scale(1.0 / h_next, next);
            }

            if let Err(d) = self.update(cols, x, precond) {
                return Err(monitor.breakdown(iterations, estimate, d));
            }
            residual(a, b, x, &mut self.r)?;
            beta = k.norm(&self.r);
            monitor.check(iterations, beta)?;

            if let Some(status) = stop {
                return Ok(monitor.result(iterations, beta, status));
            }
            if monitor.converged(beta) {
                return Ok(monitor.result(iterations, beta, Status::Success));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{Kernel, Layout, SparseMatrix};
    use crate::linsolve::precond::PreconditionerKind;
    use approx::assert_relative_eq;

    #[test]
    fn gmres_nonsymmetric() {
        // Convection dominated non-symmetric tridiagonal matrix.
        let n = 12;
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 3.0));
            if i > 0 {
                triplets.push((i, i - 1, -2.0));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -0.5));
            }
        }
        let a = SparseMatrix::from_triplets(n, &triplets, Layout::Coo, Kernel::Naive).unwrap();
        let b = vec![1.0; n];
        let criteria = Criteria {
            absolute_tolerance: 1e-13,
            relative_tolerance: 1e-12,
            ..Default::default()
        };
        for precond in [
            PreconditionerKind::Identity,
            PreconditionerKind::Sor {
                omega: 1.0,
                symmetric: false,
            },
            PreconditionerKind::Ilu0,
        ] {
            let p = precond.build(&a).unwrap();
            let mut x = vec![0.0; n];
            let result = Gmres::new(n, n)
                .solve(&a, &b, &mut x, p.as_ref(), &criteria, &mut || false)
                .unwrap();
            assert!(result.converged());
            let mut ax = vec![0.0; n];
            a.apply(&x, &mut ax).unwrap();
            for v in ax {
                assert_relative_eq!(v, 1.0, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn givens_zeroes_second_component() {
        let (c, s, d) = givens(3.0, 4.0);
        assert_relative_eq!(d, 5.0);
        assert_relative_eq!(-s * 3.0 + c * 4.0, 0.0, epsilon = 1e-12);
    }
}
