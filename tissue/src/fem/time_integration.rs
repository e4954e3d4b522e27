use serde::{Deserialize, Serialize};

/// Time integration method.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TimeIntegration {
    /// Backward Euler integration.
    ImplicitEuler,
    /// Trapezoid rule, the average acceleration Newmark scheme.
    CrankNicolson,
    /// Forward Euler integration with the acceleration as the unknown.
    ExplicitEuler,
    /// Newmark integration with the given `beta` and `gamma` parameters.
    Newmark { beta: f64, gamma: f64 },
}

impl Default for TimeIntegration {
    fn default() -> Self {
        TimeIntegration::Newmark {
            beta: 0.25,
            gamma: 0.5,
        }
    }
}

/// Coefficients of the increment form of an implicit scheme.
///
/// With `du = u_{n+1} - u_n` the updates read
///
/// ```verbatim
/// a_{n+1} = a0 du - a2 v_n - a3 a_n
/// v_{n+1} = a1 du - a4 v_n - a5 a_n
/// ```
///
/// and the increment solves `(a0 M + a1 C + K) du = F - K u_n + M (a2 v_n + a3 a_n) + C (a4 v_n + a5 a_n)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Coefficients {
    pub a0: f64,
    pub a1: f64,
    pub a2: f64,
    pub a3: f64,
    pub a4: f64,
    pub a5: f64,
}

impl Coefficients {
    fn newmark(beta: f64, gamma: f64, dt: f64) -> Self {
        Coefficients {
            a0: 1.0 / (beta * dt * dt),
            a1: gamma / (beta * dt),
            a2: 1.0 / (beta * dt),
            a3: 1.0 / (2.0 * beta) - 1.0,
            a4: gamma / beta - 1.0,
            a5: dt * (gamma / (2.0 * beta) - 1.0),
        }
    }
}

impl TimeIntegration {
    /// Returns `true` if the scheme solves for the acceleration with the mass matrix alone.
    pub fn is_explicit(&self) -> bool {
        matches!(self, TimeIntegration::ExplicitEuler)
    }

    /// Newmark `(beta, gamma)` of the scheme, if it belongs to the Newmark family.
    pub fn newmark_parameters(&self) -> Option<(f64, f64)> {
        match *self {
            TimeIntegration::CrankNicolson => Some((0.25, 0.5)),
            TimeIntegration::Newmark { beta, gamma } => Some((beta, gamma)),
            TimeIntegration::ImplicitEuler | TimeIntegration::ExplicitEuler => None,
        }
    }

    /// Increment form coefficients for the time step `dt`.
    ///
    /// Returns `None` for the explicit scheme.
    pub fn coefficients(&self, dt: f64) -> Option<Coefficients> {
        match *self {
            TimeIntegration::ImplicitEuler => Some(Coefficients {
                a0: 1.0 / (dt * dt),
                a1: 1.0 / dt,
                a2: 1.0 / dt,
                a3: 0.0,
                a4: 0.0,
                a5: 0.0,
            }),
            TimeIntegration::ExplicitEuler => None,
            _ => {
                let (beta, gamma) = self.newmark_parameters()?;
                Some(Coefficients::newmark(beta, gamma, dt))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn crank_nicolson_is_average_acceleration() {
        let dt = 0.1;
        let cn = TimeIntegration::CrankNicolson.coefficients(dt).unwrap();
        let nm = TimeIntegration::default().coefficients(dt).unwrap();
        assert_eq!(cn, nm);
        assert_relative_eq!(cn.a0, 400.0);
        assert_relative_eq!(cn.a1, 20.0);
        assert_relative_eq!(cn.a2, 40.0);
        assert_relative_eq!(cn.a3, 1.0);
        assert_relative_eq!(cn.a4, 1.0);
        assert_relative_eq!(cn.a5, 0.0);
    }

    #[test]
    fn implicit_euler_updates() {
        // With du = dt v_{n+1} the acceleration is the backward difference of velocities.
        let dt = 0.5;
        let c = TimeIntegration::ImplicitEuler.coefficients(dt).unwrap();
        let (v, a, v_next) = (2.0, 7.0, 3.0);
        let du = dt * v_next;
        assert_relative_eq!(c.a1 * du - c.a4 * v - c.a5 * a, v_next);
        assert_relative_eq!(c.a0 * du - c.a2 * v - c.a3 * a, (v_next - v) / dt);
        assert!(TimeIntegration::ExplicitEuler.coefficients(dt).is_none());
        assert!(TimeIntegration::ExplicitEuler.is_explicit());
    }
}
