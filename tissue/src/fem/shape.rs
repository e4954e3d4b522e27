//! Lagrange shape functions on reference cells.
//!
//! Node orderings:
//! - `Tet4`: the cell vertices. `Tet10`: vertices followed by the midpoints of
//!   [`TET_EDGES`](crate::mesh::TET_EDGES).
//! - `Hex8`: VTK vertex ordering. `Hex27`: the `{0, 1/2, 1}^3` lattice, `x` fastest.
//! - `Tri3`: the face vertices. `Tri6`: vertices followed by the midpoints of edges
//!   `(0, 1), (1, 2), (2, 0)`.
//! - `Quad4`: the face vertices. `Quad9`: the `{0, 1/2, 1}^2` lattice, `x` fastest.

use crate::fem::quadrature::Quadrature;
use crate::mesh::{CellKind, FaceKind, HEX_CORNERS, QUAD_CORNERS, TET_EDGES};

/// Local edges of a triangle used by `Tri6`.
pub const TRI_EDGES: [[usize; 2]; 3] = [[0, 1], [1, 2], [2, 0]];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    Tet4,
    Tet10,
    Hex8,
    Hex27,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FaceType {
    Tri3,
    Tri6,
    Quad4,
    Quad9,
}

/// 1D Lagrange basis on `{0, 1}` or `{0, 1/2, 1}` and its derivatives.
fn lagrange_1d(degree: usize, t: f64) -> ([f64; 3], [f64; 3]) {
    if degree == 1 {
        ([1.0 - t, t, 0.0], [-1.0, 1.0, 0.0])
    } else {
        (
            [
                2.0 * t * t - 3.0 * t + 1.0,
                4.0 * t * (1.0 - t),
                2.0 * t * t - t,
            ],
            [4.0 * t - 3.0, 4.0 - 8.0 * t, 4.0 * t - 1.0],
        )
    }
}

/// Barycentric coordinates of a simplex point followed by their constant gradients.
fn barycentric<const D: usize>(xi: &[f64]) -> ([f64; 4], [[f64; 3]; 4]) {
    let mut l = [0.0; 4];
    let mut g = [[0.0; 3]; 4];
    l[0] = 1.0 - xi[..D].iter().sum::<f64>();
    for d in 0..D {
        l[d + 1] = xi[d];
        g[0][d] = -1.0;
        g[d + 1][d] = 1.0;
    }
    (l, g)
}

/// Quadratic simplex basis: vertex functions then edge functions.
fn quadratic_simplex<const D: usize>(
    xi: &[f64],
    edges: &[[usize; 2]],
    values: &mut [f64],
    grads: &mut [[f64; 3]],
) {
    let (l, g) = barycentric::<D>(xi);
    for v in 0..=D {
        values[v] = l[v] * (2.0 * l[v] - 1.0);
        for k in 0..3 {
            grads[v][k] = (4.0 * l[v] - 1.0) * g[v][k];
        }
    }
    for (e, &[a, b]) in edges.iter().enumerate() {
        let i = D + 1 + e;
        values[i] = 4.0 * l[a] * l[b];
        for k in 0..3 {
            grads[i][k] = 4.0 * (l[b] * g[a][k] + l[a] * g[b][k]);
        }
    }
}

impl ElementType {
    pub fn new(kind: CellKind, degree: u32) -> Option<ElementType> {
        match (kind, degree) {
            (CellKind::Tetrahedron, 1) => Some(ElementType::Tet4),
            (CellKind::Tetrahedron, 2) => Some(ElementType::Tet10),
            (CellKind::Hexahedron, 1) => Some(ElementType::Hex8),
            (CellKind::Hexahedron, 2) => Some(ElementType::Hex27),
            _ => None,
        }
    }

    pub fn num_nodes(self) -> usize {
        match self {
            ElementType::Tet4 => 4,
            ElementType::Tet10 => 10,
            ElementType::Hex8 => 8,
            ElementType::Hex27 => 27,
        }
    }

    /// Linear element describing the cell geometry.
    pub fn geometry(self) -> ElementType {
        match self {
            ElementType::Tet4 | ElementType::Tet10 => ElementType::Tet4,
            ElementType::Hex8 | ElementType::Hex27 => ElementType::Hex8,
        }
    }

    pub fn quadrature(self, order: u32) -> Option<Quadrature> {
        match self {
            ElementType::Tet4 | ElementType::Tet10 => Quadrature::tetrahedron(order),
            ElementType::Hex8 | ElementType::Hex27 => Quadrature::hexahedron(order),
        }
    }

    /// Evaluates all shape functions and their reference gradients at `xi`.
    pub fn eval(self, xi: [f64; 3], values: &mut [f64], grads: &mut [[f64; 3]]) {
        match self {
            ElementType::Tet4 => {
                let (l, g) = barycentric::<3>(&xi);
                values[..4].copy_from_slice(&l);
                grads[..4].copy_from_slice(&g);
            }
            ElementType::Tet10 => quadratic_simplex::<3>(&xi, &TET_EDGES, values, grads),
            ElementType::Hex8 => {
                let b: Vec<_> = xi.iter().map(|&t| lagrange_1d(1, t)).collect();
                for (i, c) in HEX_CORNERS.iter().enumerate() {
                    let (n, d) = (|k: usize| b[k].0[c[k]], |k: usize| b[k].1[c[k]]);
                    values[i] = n(0) * n(1) * n(2);
                    grads[i] = [d(0) * n(1) * n(2), n(0) * d(1) * n(2), n(0) * n(1) * d(2)];
                }
            }
            ElementType::Hex27 => {
                let b: Vec<_> = xi.iter().map(|&t| lagrange_1d(2, t)).collect();
                for i in 0..27 {
                    let c = [i % 3, (i / 3) % 3, i / 9];
                    let (n, d) = (|k: usize| b[k].0[c[k]], |k: usize| b[k].1[c[k]]);
                    values[i] = n(0) * n(1) * n(2);
                    grads[i] = [d(0) * n(1) * n(2), n(0) * d(1) * n(2), n(0) * n(1) * d(2)];
                }
            }
        }
    }
}

impl FaceType {
    pub fn new(kind: FaceKind, degree: u32) -> Option<FaceType> {
        match (kind, degree) {
            (FaceKind::Triangle, 1) => Some(FaceType::Tri3),
            (FaceKind::Triangle, 2) => Some(FaceType::Tri6),
            (FaceKind::Quadrilateral, 1) => Some(FaceType::Quad4),
            (FaceKind::Quadrilateral, 2) => Some(FaceType::Quad9),
            _ => None,
        }
    }

    pub fn num_nodes(self) -> usize {
        match self {
            FaceType::Tri3 => 3,
            FaceType::Tri6 => 6,
            FaceType::Quad4 => 4,
            FaceType::Quad9 => 9,
        }
    }

    pub fn geometry(self) -> FaceType {
        match self {
            FaceType::Tri3 | FaceType::Tri6 => FaceType::Tri3,
            FaceType::Quad4 | FaceType::Quad9 => FaceType::Quad4,
        }
    }

    pub fn quadrature(self, order: u32) -> Option<Quadrature> {
        match self {
            FaceType::Tri3 | FaceType::Tri6 => Quadrature::triangle(order),
            FaceType::Quad4 | FaceType::Quad9 => Quadrature::quadrilateral(order),
        }
    }

    /// Evaluates all shape functions and their reference gradients at `xi`.
    ///
    /// Only the first two gradient components are meaningful.
    pub fn eval(self, xi: [f64; 3], values: &mut [f64], grads: &mut [[f64; 3]]) {
        match self {
            FaceType::Tri3 => {
                let (l, g) = barycentric::<2>(&xi);
                values[..3].copy_from_slice(&l[..3]);
                grads[..3].copy_from_slice(&g[..3]);
            }
            FaceType::Tri6 => quadratic_simplex::<2>(&xi, &TRI_EDGES, values, grads),
            FaceType::Quad4 => {
                let (bx, by) = (lagrange_1d(1, xi[0]), lagrange_1d(1, xi[1]));
                for (i, c) in QUAD_CORNERS.iter().enumerate() {
                    values[i] = bx.0[c[0]] * by.0[c[1]];
                    grads[i] = [bx.1[c[0]] * by.0[c[1]], bx.0[c[0]] * by.1[c[1]], 0.0];
                }
            }
            FaceType::Quad9 => {
                let (bx, by) = (lagrange_1d(2, xi[0]), lagrange_1d(2, xi[1]));
                for i in 0..9 {
                    let (p, q) = (i % 3, i / 3);
                    values[i] = bx.0[p] * by.0[q];
                    grads[i] = [bx.1[p] * by.0[q], bx.0[p] * by.1[q], 0.0];
                }
            }
        }
    }
}

/// Shape function values and reference gradients tabulated at quadrature points.
#[derive(Clone, Debug)]
pub struct Tabulation {
    pub points: Vec<[f64; 3]>,
    pub weights: Vec<f64>,
    /// `values[q][a]`
    pub values: Vec<Vec<f64>>,
    /// `grads[q][a]`
    pub grads: Vec<Vec<[f64; 3]>>,
    /// Gradients of the linear geometry basis, `geometry_grads[q][v]`.
    pub geometry_grads: Vec<Vec<[f64; 3]>>,
}

impl Tabulation {
    fn build(
        quadrature: Quadrature,
        num_nodes: usize,
        num_geometry_nodes: usize,
        eval: impl Fn([f64; 3], &mut [f64], &mut [[f64; 3]]),
        eval_geometry: impl Fn([f64; 3], &mut [f64], &mut [[f64; 3]]),
    ) -> Tabulation {
        let mut values = Vec::with_capacity(quadrature.len());
        let mut grads = Vec::with_capacity(quadrature.len());
        let mut geometry_grads = Vec::with_capacity(quadrature.len());
        let mut scratch = vec![0.0; num_geometry_nodes];
        for &xi in &quadrature.points {
            let mut n = vec![0.0; num_nodes];
            let mut dn = vec![[0.0; 3]; num_nodes];
            eval(xi, &mut n, &mut dn);
            let mut dg = vec![[0.0; 3]; num_geometry_nodes];
            eval_geometry(xi, &mut scratch, &mut dg);
            values.push(n);
            grads.push(dn);
            geometry_grads.push(dg);
        }
        Tabulation {
            points: quadrature.points,
            weights: quadrature.weights,
            values,
            grads,
            geometry_grads,
        }
    }

    pub fn cell(ty: ElementType, order: u32) -> Option<Tabulation> {
        let geo = ty.geometry();
        Some(Tabulation::build(
            ty.quadrature(order)?,
            ty.num_nodes(),
            geo.num_nodes(),
            |xi, n, dn| ty.eval(xi, n, dn),
            |xi, n, dn| geo.eval(xi, n, dn),
        ))
    }

    pub fn face(ty: FaceType, order: u32) -> Option<Tabulation> {
        let geo = ty.geometry();
        Some(Tabulation::build(
            ty.quadrature(order)?,
            ty.num_nodes(),
            geo.num_nodes(),
            |xi, n, dn| ty.eval(xi, n, dn),
            |xi, n, dn| geo.eval(xi, n, dn),
        ))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}
