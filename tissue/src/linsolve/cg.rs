use super::precond::Preconditioner;
use super::{residual, Criteria, Monitor, SolveResult, Status};
use crate::linalg::LinearOperator;
use crate::Error;

/// Preconditioned conjugate gradient method.
///
/// Solves `Ax = b` for symmetric positive definite `A` with a symmetric positive definite
/// preconditioner. A non-positive curvature `p'Ap` is reported as a breakdown.
/// https://en.wikipedia.org/wiki/Conjugate_gradient_method
#[allow(non_snake_case)]
pub struct ConjugateGradient {
    r: Vec<f64>,
    z: Vec<f64>,
    p: Vec<f64>,
    Ap: Vec<f64>,
}

impl ConjugateGradient {
    #[allow(non_snake_case)]
    pub fn new(size: usize) -> Self {
        let r = vec![0.0; size];
        let z = r.clone();
        let p = r.clone();
        let Ap = r.clone();
        ConjugateGradient { r, z, p, Ap }
    }

    #[allow(non_snake_case)]
    pub fn solve<A: LinearOperator + ?Sized>(
        &mut self,
        a: &A,
        b: &[f64],
        x: &mut [f64],
        precond: &dyn Preconditioner,
        criteria: &Criteria,
        interrupted: &mut dyn FnMut() -> bool,
    ) -> Result<SolveResult, Error> {
        let ConjugateGradient {
            ref mut r,
            ref mut z,
            ref mut p,
            ref mut Ap,
        } = *self;
        let k = a.kernel();

        // r0 = b - A x0
        residual(a, b, x, r)?;
        let mut r_norm = k.norm(r);
        let monitor = Monitor::new(*criteria, r_norm);
        monitor.check(0, r_norm)?;
        if monitor.trivial() {
            return Ok(monitor.result(0, r_norm, Status::Success));
        }

        // p0 = z0 = M⁻¹ r0
        precond.apply(r, z);
        p.copy_from_slice(z);
        let mut rz = k.dot(r, z);

        let mut iterations = 0;
        loop {
            if monitor.exhausted(iterations) {
                return Ok(monitor.result(iterations, r_norm, Status::MaximumIterationsExceeded));
            }
            if interrupted() {
                return Ok(monitor.result(iterations, r_norm, Status::Interrupted));
            }

            a.apply(p, Ap)?;
            let pAp = k.dot(p, Ap);
            if !(pAp > 0.0) {
                return Err(monitor.breakdown(iterations, r_norm, pAp));
            }

            // α = r'z / p'Ap
            let alpha = rz / pAp;
            k.axpy(alpha, p, x);
            k.axpy(-alpha, Ap, r);
            iterations += 1;

            r_norm = k.norm(r);
            log::trace!("CG iteration {}: residual {:e}", iterations, r_norm);
            monitor.check(iterations, r_norm)?;
            if monitor.converged(r_norm) {
                return Ok(monitor.result(iterations, r_norm, Status::Success));
            }

            precond.apply(r, z);
            let rz_new = k.dot(r, z);
            let beta = rz_new / rz;
            rz = rz_new;

            // p = z + βp
            k.xpby(z, beta, p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{Kernel, Layout, SparseMatrix};
    use crate::linsolve::precond::Identity;

    #[test]
    fn cg_simple() {
        // Symmetric positive definite 2x2 system.
        let mtx = SparseMatrix::from_triplets(
            2,
            &[(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)],
            Layout::Dense,
            Kernel::Blas,
        )
        .unwrap();
        let b = [1.0, 2.0];
        let mut x = [0.0, 0.0];
        let result = ConjugateGradient::new(2)
            .solve(
                &mtx,
                &b,
                &mut x,
                &Identity,
                &Criteria::default(),
                &mut || false,
            )
            .unwrap();

        // Exact in at most n iterations.
        assert!(result.iterations <= 2);
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-10, "actual: {}", x[0]);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-10, "actual: {}", x[1]);
    }
}
