//! Quadrature rules on reference cells.
//!
//! Reference cells are the unit cube `[0, 1]^3`, the unit square, and the unit simplices with
//! vertices at the origin and the unit axes. Face rules use the first two coordinates.

/// Gauss-Legendre nodes and weights on `[-1, 1]` for up to 7 points.
const GAUSS_LEGENDRE: [&[(f64, f64)]; 7] = [
    &[(0.0, 2.0)],
    &[(-0.5773502691896257, 1.0), (0.5773502691896257, 1.0)],
    &[
        (-0.7745966692414834, 0.5555555555555556),
        (0.0, 0.8888888888888888),
        (0.7745966692414834, 0.5555555555555556),
    ],
    &[
        (-0.8611363115940526, 0.3478548451374538),
        (-0.3399810435848563, 0.6521451548625461),
        (0.3399810435848563, 0.6521451548625461),
        (0.8611363115940526, 0.3478548451374538),
    ],
    &[
        (-0.9061798459386640, 0.2369268850561891),
        (-0.5384693101056831, 0.4786286704993665),
        (0.0, 0.5688888888888889),
        (0.5384693101056831, 0.4786286704993665),
        (0.9061798459386640, 0.2369268850561891),
    ],
    &[
        (-0.9324695142031521, 0.1713244923791704),
        (-0.6612093864662645, 0.3607615730481386),
        (-0.2386191860831969, 0.4679139345726910),
        (0.2386191860831969, 0.4679139345726910),
        (0.6612093864662645, 0.3607615730481386),
        (0.9324695142031521, 0.1713244923791704),
    ],
    &[
        (-0.9491079123427585, 0.1294849661688697),
        (-0.7415311855993945, 0.2797053914892766),
        (-0.4058451513773972, 0.3818300505051189),
        (0.0, 0.4179591836734694),
        (0.4058451513773972, 0.3818300505051189),
        (0.7415311855993945, 0.2797053914892766),
        (0.9491079123427585, 0.1294849661688697),
    ],
];

/// Highest polynomial order with a supported rule.
pub const MAX_ORDER: u32 = 11;

#[derive(Clone, Debug, PartialEq)]
pub struct Quadrature {
    pub points: Vec<[f64; 3]>,
    pub weights: Vec<f64>,
}

/// Gauss-Legendre rule on `[0, 1]` with `n` points.
fn gauss_01(n: usize) -> Vec<(f64, f64)> {
    GAUSS_LEGENDRE[n - 1]
        .iter()
        .map(|&(x, w)| (0.5 * (x + 1.0), 0.5 * w))
        .collect()
}

/// Number of Gauss points integrating polynomials of the given degree exactly.
fn num_points(degree: u32) -> Option<usize> {
    let n = (degree as usize + 2) / 2;
    if n == 0 || n > GAUSS_LEGENDRE.len() {
        None
    } else {
        Some(n)
    }
}

impl Quadrature {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Tensor product Gauss rule on the unit cube exact for the given order per direction.
    pub fn hexahedron(order: u32) -> Option<Quadrature> {
        if order > MAX_ORDER {
            return None;
        }
        let rule = gauss_01(num_points(order)?);
        let mut points = Vec::with_capacity(rule.len().pow(3));
        let mut weights = Vec::with_capacity(rule.len().pow(3));
        for &(z, wz) in &rule {
            for &(y, wy) in &rule {
                for &(x, wx) in &rule {
                    points.push([x, y, z]);
                    weights.push(wx * wy * wz);
                }
            }
        }
        Some(Quadrature { points, weights })
    }

    pub fn quadrilateral(order: u32) -> Option<Quadrature> {
        if order > MAX_ORDER {
            return None;
        }
        let rule = gauss_01(num_points(order)?);
        let mut points = Vec::with_capacity(rule.len().pow(2));
        let mut weights = Vec::with_capacity(rule.len().pow(2));
        for &(y, wy) in &rule {
            for &(x, wx) in &rule {
                points.push([x, y, 0.0]);
                weights.push(wx * wy);
            }
        }
        Some(Quadrature { points, weights })
    }

    /// Rule on the unit tetrahedron exact for polynomials of total degree `order`.
    ///
    /// Low orders use symmetric rules, higher orders a collapsed tensor product rule.
    pub fn tetrahedron(order: u32) -> Option<Quadrature> {
        match order {
            0 | 1 => Some(Quadrature {
                points: vec![[0.25; 3]],
                weights: vec![1.0 / 6.0],
            }),
            2 => {
                let a = 0.5854101966249685;
                let b = 0.1381966011250105;
                Some(Quadrature {
                    points: vec![[b, b, b], [a, b, b], [b, a, b], [b, b, a]],
                    weights: vec![1.0 / 24.0; 4],
                })
            }
            o if o <= MAX_ORDER => {
                // x = u, y = v (1 - u), z = w (1 - u)(1 - v) raises the degree in u by two and in
                // v by one.
                let ru = gauss_01(num_points(o + 2)?);
                let rv = gauss_01(num_points(o + 1)?);
                let rw = gauss_01(num_points(o)?);
                let mut points = Vec::new();
                let mut weights = Vec::new();
                for &(u, wu) in &ru {
                    for &(v, wv) in &rv {
                        for &(w, ww) in &rw {
                            points.push([u, v * (1.0 - u), w * (1.0 - u) * (1.0 - v)]);
                            weights.push(wu * wv * ww * (1.0 - u) * (1.0 - u) * (1.0 - v));
                        }
                    }
                }
                Some(Quadrature { points, weights })
            }
            _ => None,
        }
    }

    /// Rule on the unit triangle exact for polynomials of total degree `order`.
    pub fn triangle(order: u32) -> Option<Quadrature> {
        match order {
            0 | 1 => Some(Quadrature {
                points: vec![[1.0 / 3.0, 1.0 / 3.0, 0.0]],
                weights: vec![0.5],
            }),
            2 => {
                let (a, b) = (1.0 / 6.0, 2.0 / 3.0);
                Some(Quadrature {
                    points: vec![[a, a, 0.0], [b, a, 0.0], [a, b, 0.0]],
                    weights: vec![1.0 / 6.0; 3],
                })
            }
            o if o <= MAX_ORDER => {
                let ru = gauss_01(num_points(o + 1)?);
                let rv = gauss_01(num_points(o)?);
                let mut points = Vec::new();
                let mut weights = Vec::new();
                for &(u, wu) in &ru {
                    for &(v, wv) in &rv {
                        points.push([u, v * (1.0 - u), 0.0]);
                        weights.push(wu * wv * (1.0 - u));
                    }
                }
                Some(Quadrature { points, weights })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Integral of `x^a y^b z^c` over the unit tetrahedron.
    fn tet_monomial(a: i32, b: i32, c: i32) -> f64 {
        let f = |n: i32| (1..=n).map(|k| k as f64).product::<f64>();
        f(a) * f(b) * f(c) / f(a + b + c + 3)
    }

    fn integrate(q: &Quadrature, f: impl Fn([f64; 3]) -> f64) -> f64 {
        q.points
            .iter()
            .zip(q.weights.iter())
            .map(|(&p, &w)| w * f(p))
            .sum()
    }

    #[test]
    fn hexahedron_rules_are_exact() {
        for order in 1..=MAX_ORDER {
            let q = Quadrature::hexahedron(order).unwrap();
            let d = order as i32;
            let exact = 1.0 / ((d + 1) as f64).powi(3);
            let approx = integrate(&q, |p| p[0].powi(d) * p[1].powi(d) * p[2].powi(d));
            assert_relative_eq!(approx, exact, max_relative = 1e-12);
        }
        assert!(Quadrature::hexahedron(MAX_ORDER + 1).is_none());
    }

    #[test]
    fn tetrahedron_rules_are_exact() {
        for order in 1..=MAX_ORDER {
            let q = Quadrature::tetrahedron(order).unwrap();
            assert_relative_eq!(q.weights.iter().sum::<f64>(), 1.0 / 6.0, epsilon = 1e-14);
            let d = order as i32;
            // Split the degree among the coordinates.
            let (a, b, c) = (d - d / 2, d / 2 - d / 4, d / 4);
            let approx = integrate(&q, |p| p[0].powi(a) * p[1].powi(b) * p[2].powi(c));
            assert_relative_eq!(approx, tet_monomial(a, b, c), max_relative = 1e-12);
        }
    }

    #[test]
    fn triangle_rules_are_exact() {
        for order in 1..=MAX_ORDER {
            let q = Quadrature::triangle(order).unwrap();
            let d = order as i32;
            let (a, b) = (d - d / 2, d / 2);
            let f = |n: i32| (1..=n).map(|k| k as f64).product::<f64>();
            let exact = f(a) * f(b) / f(a + b + 2);
            let approx = integrate(&q, |p| p[0].powi(a) * p[1].powi(b));
            assert_relative_eq!(approx, exact, max_relative = 1e-12);
        }
    }
}
