use super::precond::Preconditioner;
use super::{residual, Criteria, Monitor, SolveResult, Status};
use crate::linalg::LinearOperator;
use crate::Error;

/// Implementation of the preconditioned conjugate residual method.
///
/// The Conjugate Residual method solves the system `Ax = b` where `A` is Hermitian. Unlike CG
/// it does not require `A` to be definite, only the preconditioner.
/// https://en.wikipedia.org/wiki/Conjugate_residual_method
#[allow(non_snake_case)]
pub struct ConjugateResidual {
    r: Vec<f64>,
    z: Vec<f64>,
    p: Vec<f64>,
    Az: Vec<f64>,
    Ap: Vec<f64>,
    /// Preconditioned `Ap`.
    q: Vec<f64>,
}

impl ConjugateResidual {
    #[allow(non_snake_case)]
    pub fn new(size: usize) -> Self {
        let r = vec![0.0; size];
        let z = r.clone();
        let p = r.clone();
        let Az = r.clone();
        let Ap = r.clone();
        let q = r.clone();
        ConjugateResidual { r, z, p, Az, Ap, q }
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
        let ConjugateResidual {
            ref mut r,
            ref mut z,
            ref mut p,
            ref mut Az,
            ref mut Ap,
            ref mut q,
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

        // p0 = z0 = M⁻¹ r0, Ap0 = Az0
        precond.apply(r, z);
        p.copy_from_slice(z);
        a.apply(z, Az)?;
        Ap.copy_from_slice(Az);
        let mut zAz = k.dot(z, Az);

        let mut iterations = 0;
        loop {
            if monitor.exhausted(iterations) {
                return Ok(monitor.result(iterations, r_norm, Status::MaximumIterationsExceeded));
            }
            if interrupted() {
                return Ok(monitor.result(iterations, r_norm, Status::Interrupted));
            }

            // α = z'Az / p'A'M⁻¹Ap
            precond.apply(Ap, q);
            let denom = k.dot(Ap, q);
            if !(denom.abs() > 0.0) || zAz == 0.0 {
                return Err(monitor.breakdown(iterations, r_norm, denom));
            }
            let alpha = zAz / denom;

            // x = x + αp, r = r - αAp, z = z - αM⁻¹Ap
            k.axpy(alpha, p, x);
            k.axpy(-alpha, Ap, r);
            k.axpy(-alpha, q, z);
            iterations += 1;

            r_norm = k.norm(r);
            log::trace!("CR iteration {}: residual {:e}", iterations, r_norm);
            monitor.check(iterations, r_norm)?;
            if monitor.converged(r_norm) {
                return Ok(monitor.result(iterations, r_norm, Status::Success));
            }

            a.apply(z, Az)?;
            let zAz_new = k.dot(z, Az);
            let beta = zAz_new / zAz;
            zAz = zAz_new;

            // p = z + βp, Ap = Az + βAp
            k.xpby(z, beta, p);
            k.xpby(Az, beta, Ap);
        }
    }
}
