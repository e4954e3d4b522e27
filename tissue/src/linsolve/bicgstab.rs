use super::precond::Preconditioner;
use super::{residual, Criteria, Monitor, SolveResult, Status};
use crate::linalg::LinearOperator;
use crate::Error;

/// Implementation of the right-preconditioned BiConjugate Gradient STABilized (BiCGSTAB)
/// algorithm for non-symmetric linear systems.
/// https://en.wikipedia.org/wiki/Biconjugate_gradient_stabilized_method
#[allow(non_snake_case)]
pub struct BiCgStab {
    r: Vec<f64>,
    r0s: Vec<f64>,
    p: Vec<f64>,
    v: Vec<f64>,
    s: Vec<f64>,
    t: Vec<f64>,
    /// Preconditioned search direction.
    y: Vec<f64>,
    /// Preconditioned intermediate residual.
    z: Vec<f64>,
}

impl BiCgStab {
    pub fn new(size: usize) -> Self {
        let r = vec![0.0; size];
        BiCgStab {
            r0s: r.clone(),
            p: r.clone(),
            v: r.clone(),
            s: r.clone(),
            t: r.clone(),
            y: r.clone(),
            z: r.clone(),
            r,
        }
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
        let BiCgStab {
            ref mut r,
            ref mut r0s,
            ref mut p,
            ref mut v,
            ref mut s,
            ref mut t,
            ref mut y,
            ref mut z,
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

        // Choose r0s arbitrary such that (r0s, r) != 0. We chose r0s = r.
        r0s.copy_from_slice(r);
        let mut r0s_norm_sq = r_norm * r_norm;
        p.iter_mut().for_each(|p| *p = 0.0);
        v.iter_mut().for_each(|v| *v = 0.0);

        // Initialize temporaries.
        let mut rho = 1.0;
        let mut alpha = 1.0;
        let mut w = 1.0;
        let eps_sq = f64::EPSILON * f64::EPSILON;

        let mut iterations = 0;
        loop {
            if monitor.exhausted(iterations) {
                return Ok(monitor.result(iterations, r_norm, Status::MaximumIterationsExceeded));
            }
            if interrupted() {
                return Ok(monitor.result(iterations, r_norm, Status::Interrupted));
            }

            let mut rho_new = k.dot(r0s, r);

            // Restart with a different r0s if r becomes orthogonal to r0s.
            if rho_new.abs() <= eps_sq * r0s_norm_sq {
                r0s.copy_from_slice(r);
                rho_new = r_norm * r_norm;
                r0s_norm_sq = rho_new;
                p.iter_mut().for_each(|p| *p = 0.0);
                v.iter_mut().for_each(|v| *v = 0.0);
                rho = 1.0;
                alpha = 1.0;
                w = 1.0;
                log::trace!("r too orthogonal to r0s, restarting with rho = {:?}", rho_new);
            }

            // β = (ρ_new/ρ) (α/w)
            let beta = (rho_new / rho) * (alpha / w);
            rho = rho_new;

            // p = r + β(p - wv)
            k.axpy(-w, v, p);
            k.xpby(r, beta, p);

            // v = A M⁻¹ p
            precond.apply(p, y);
            a.apply(y, v)?;
            let r0s_v = k.dot(r0s, v);
            if !(r0s_v.abs() > 0.0) {
                return Err(monitor.breakdown(iterations, r_norm, r0s_v));
            }
            alpha = rho / r0s_v;

            // s = r - αv, x = x + α M⁻¹ p
            k.lincomb(1.0, r, -alpha, v, s);
            k.axpy(alpha, y, x);

            let s_norm = k.norm(s);
            monitor.check(iterations + 1, s_norm)?;
            if monitor.converged(s_norm) {
                r.copy_from_slice(s);
                return Ok(monitor.result(iterations + 1, s_norm, Status::Success));
            }

            // t = A M⁻¹ s
            precond.apply(s, z);
            a.apply(z, t)?;
            let tt = k.dot(t, t);
            if !(tt > 0.0) {
                return Err(monitor.breakdown(iterations, s_norm, tt));
            }
            w = k.dot(t, s) / tt;
            if w == 0.0 {
                return Err(monitor.breakdown(iterations, s_norm, w));
            }

            // x = x + w M⁻¹ s, r = s - wt
            k.axpy(w, z, x);
            k.lincomb(1.0, s, -w, t, r);
            iterations += 1;

            r_norm = k.norm(r);
            log::trace!("BiCGSTAB iteration {}: residual {:e}", iterations, r_norm);
            monitor.check(iterations, r_norm)?;
            if monitor.converged(r_norm) {
                return Ok(monitor.result(iterations, r_norm, Status::Success));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{Kernel, Layout, SparseMatrix};
    use crate::linsolve::precond::Identity;

    #[test]
    fn bicgstab_simple() {
        // Non-symmetric 2x2 system.
        let mtx = SparseMatrix::from_triplets(
            2,
            &[(0, 0, 4.0), (0, 1, 1.0), (1, 0, -2.0), (1, 1, 3.0)],
            Layout::Ell,
            Kernel::Naive,
        )
        .unwrap();
        let b = [6.0, 4.0];
        let mut x = [0.0, 0.0];
        let result = BiCgStab::new(2)
            .solve(
                &mtx,
                &b,
                &mut x,
                &Identity,
                &Criteria::default(),
                &mut || false,
            )
            .unwrap();
        assert!(result.converged());
        assert!((x[0] - 1.0).abs() < 1e-8, "actual: {}", x[0]);
        assert!((x[1] - 2.0).abs() < 1e-8, "actual: {}", x[1]);
    }
}
