//! Assembly of the mass and stiffness operators and the static load.
//!
//! Element matrices are computed in parallel and merged serially in cell order, so repeated
//! assembly of the same problem produces bit-identical operators. Dirichlet constraints are
//! eliminated during the merge: constrained rows and columns hold only a unit diagonal and the
//! coupling to prescribed values is moved into the load.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::boundary::{BoundaryConditions, Constraint};
use crate::config::{ConfigError, ElasticityParams};
use crate::fem::dof_map::DofMap;
use crate::fem::shape::{ElementType, FaceType, Tabulation};
use crate::linalg::{Kernel, Layout, SparseMatrix, TripletBuilder};
use crate::mesh::Mesh;
use crate::Error;

/// Relative Jacobian determinant below which an element counts as degenerate.
const DEGENERATE_TOLERANCE: f64 = 1e-12;

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("Cell {cell} is inverted (det J = {det:e})")]
    InvertedElement { cell: usize, det: f64 },
    #[error("Cell {cell} is degenerate (det J = {det:e})")]
    DegenerateElement { cell: usize, det: f64 },
    #[error("Boundary face {face} has zero area")]
    DegenerateFace { face: usize },
}

/// Linear isotropic elastic material.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Material {
    pub density: f64,
    pub lambda: f64,
    pub mu: f64,
    /// Gravitational acceleration.
    pub gravity: [f64; 3],
}

impl From<&ElasticityParams> for Material {
    fn from(p: &ElasticityParams) -> Material {
        Material {
            density: p.density,
            lambda: p.lambda,
            mu: p.mu,
            gravity: p.gravity_vector(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AssemblyParams {
    pub material: Material,
    pub quadrature_order: u32,
    pub degree: u32,
    pub layout: Layout,
    pub kernel: Kernel,
}

/// Assembled operators with Dirichlet constraints eliminated.
#[derive(Clone, Debug)]
pub struct Operators {
    pub mass: SparseMatrix,
    pub stiffness: SparseMatrix,
    /// Static load: body forces, boundary tractions, point forces and the lifting of
    /// prescribed displacements. Zero on constrained DOFs.
    pub load: Vec<f64>,
    /// Constrained DOFs and their prescribed displacements, sorted by DOF.
    pub dirichlet: Vec<(usize, f64)>,
}

impl Operators {
    pub fn num_dofs(&self) -> usize {
        self.load.len()
    }

    /// Overwrites the constrained entries of `v` with `value(prescribed)`.
    pub fn set_constrained(&self, v: &mut [f64], value: impl Fn(f64) -> f64) {
        for &(dof, g) in &self.dirichlet {
            v[dof] = value(g);
        }
    }
}

/// Element contribution before elimination.
struct Local {
    /// Stiffness over the DOFs of the cell, node major.
    stiffness: na::DMatrix<f64>,
    /// Scalar mass over the nodes of the cell.
    mass: na::DMatrix<f64>,
    body_force: Vec<f64>,
}

pub struct OperatorAssembler<'a> {
    mesh: &'a Mesh,
    dof_map: DofMap,
    params: AssemblyParams,
    /// Tabulations per distinct element type, and the index into them for every cell.
    cell_tabulations: Vec<(ElementType, Tabulation)>,
    cell_tabulation_index: Vec<usize>,
    face_tabulations: Vec<(FaceType, Tabulation)>,
    face_tabulation_index: Vec<usize>,
}

fn unsupported(path: &str, message: String) -> Error {
    ConfigError::Invalid {
        path: path.to_string(),
        message,
    }
    .into()
}

impl<'a> OperatorAssembler<'a> {
    pub fn new(mesh: &'a Mesh, params: AssemblyParams) -> Result<Self, Error> {
        let dof_map = DofMap::new(mesh, params.degree).ok_or_else(|| {
            unsupported(
                "finite_elements.displacement_degree",
                format!("Degree {} elements are not available", params.degree),
            )
        })?;

        let order = params.quadrature_order;
        let mut cell_tabulations: Vec<(ElementType, Tabulation)> = Vec::new();
        let mut cell_tabulation_index = Vec::with_capacity(mesh.num_cells());
        for cell in 0..mesh.num_cells() {
            let ty = dof_map.cell_type(cell);
            let index = match cell_tabulations.iter().position(|(t, _)| *t == ty) {
                Some(index) => index,
                None => {
                    let tab = Tabulation::cell(ty, order).ok_or_else(|| {
                        unsupported(
                            "quadrature_order",
                            format!("No order {} rule for {:?} elements", order, ty),
                        )
                    })?;
                    cell_tabulations.push((ty, tab));
                    cell_tabulations.len() - 1
                }
            };
            cell_tabulation_index.push(index);
        }
        let mut face_tabulations: Vec<(FaceType, Tabulation)> = Vec::new();
        let mut face_tabulation_index = Vec::with_capacity(mesh.faces().len());
        for face in 0..mesh.faces().len() {
            let ty = dof_map.face_type(face);
            let index = match face_tabulations.iter().position(|(t, _)| *t == ty) {
                Some(index) => index,
                None => {
                    let tab = Tabulation::face(ty, order).ok_or_else(|| {
                        unsupported(
                            "quadrature_order",
                            format!("No order {} rule for {:?} faces", order, ty),
                        )
                    })?;
                    face_tabulations.push((ty, tab));
                    face_tabulations.len() - 1
                }
            };
            face_tabulation_index.push(index);
        }

        Ok(OperatorAssembler {
            mesh,
            dof_map,
            params,
            cell_tabulations,
            cell_tabulation_index,
            face_tabulations,
            face_tabulation_index,
        })
    }

    pub fn dof_map(&self) -> &DofMap {
        &self.dof_map
    }

    pub fn into_dof_map(self) -> DofMap {
        self.dof_map
    }

    fn cell_tabulation(&self, cell: usize) -> (ElementType, &Tabulation) {
        let (ty, tab) = &self.cell_tabulations[self.cell_tabulation_index[cell]];
        (*ty, tab)
    }

    fn face_tabulation(&self, face: usize) -> &Tabulation {
        &self.face_tabulations[self.face_tabulation_index[face]].1
    }

    /// Assembles mass, stiffness and the static load for the given boundary conditions.
    pub fn assemble(&self, bcs: &BoundaryConditions) -> Result<Operators, Error> {
        bcs.validate(self.mesh)?;

        let num_dofs = self.dof_map.num_dofs();
        let prescribed = self.prescribed_values(bcs);
        let mut constrained = vec![None; num_dofs];
        for (&dof, &g) in &prescribed {
            constrained[dof] = Some(g);
        }

        let locals = (0..self.mesh.num_cells())
            .into_par_iter()
            .map(|cell| self.cell_contribution(cell))
            .collect::<Result<Vec<_>, _>>()?;

        let nnz_estimate: usize = locals.iter().map(|l| l.stiffness.len()).sum();
        let mut stiffness = TripletBuilder::with_capacity(num_dofs, nnz_estimate);
        let mut mass = TripletBuilder::with_capacity(num_dofs, nnz_estimate);
        let mut load = vec![0.0; num_dofs];

        for (cell, local) in locals.iter().enumerate() {
            let nodes = self.dof_map.cell_nodes(cell);
            let dofs = self.dof_map.cell_dofs(cell);
            for (a, &row) in dofs.iter().enumerate() {
                if constrained[row].is_some() {
                    continue;
                }
                load[row] += local.body_force[a];
                for (b, &col) in dofs.iter().enumerate() {
                    let value = local.stiffness[(a, b)];
                    match constrained[col] {
                        None => stiffness.add(row, col, value),
                        Some(g) => load[row] -= value * g,
                    }
                }
            }
            for (a, &node_a) in nodes.iter().enumerate() {
                for (b, &node_b) in nodes.iter().enumerate() {
                    let value = local.mass[(a, b)];
                    for c in 0..3 {
                        let (row, col) = (DofMap::dof(node_a, c), DofMap::dof(node_b, c));
                        if constrained[row].is_none() && constrained[col].is_none() {
                            mass.add(row, col, value);
                        }
                    }
                }
            }
        }

        for &dof in prescribed.keys() {
            stiffness.add(dof, dof, 1.0);
            mass.add(dof, dof, 1.0);
        }

        self.add_boundary_loads(bcs, &constrained, &mut load)?;

        let (layout, kernel) = (self.params.layout, self.params.kernel);
        let operators = Operators {
            mass: mass.finalize(layout, kernel),
            stiffness: stiffness.finalize(layout, kernel),
            load,
            dirichlet: prescribed.into_iter().collect(),
        };
        log::info!(
            "Assembled {} DOFs ({} constrained), stiffness nnz {}",
            num_dofs,
            operators.dirichlet.len(),
            operators.stiffness.nnz()
        );
        Ok(operators)
    }

    /// Prescribed displacement per constrained DOF.
    ///
    /// Point constraints override face constraints on the same node.
    fn prescribed_values(&self, bcs: &BoundaryConditions) -> BTreeMap<usize, f64> {
        let mut prescribed = BTreeMap::new();
        for (face, data) in self.mesh.faces().iter().enumerate() {
            if let Some(Constraint::Dirichlet { displacement }) = bcs.get(data.material) {
                for &node in self.dof_map.face_nodes(face) {
                    for (c, &g) in displacement.iter().enumerate() {
                        prescribed.insert(DofMap::dof(node, c), g);
                    }
                }
            }
        }
        for pc in bcs.point_constraints() {
            for (c, &g) in pc.displacement.iter().enumerate() {
                prescribed.insert(DofMap::dof(pc.node, c), g);
            }
        }
        prescribed
    }

    fn cell_contribution(&self, cell: usize) -> Result<Local, AssemblyError> {
        let (ty, tab) = self.cell_tabulation(cell);
        let vertices = &self.mesh.cells()[cell].nodes;
        let positions = self.mesh.nodes();
        let n = ty.num_nodes();
        let Material {
            density,
            lambda,
            mu,
            gravity,
        } = self.params.material;

        let diameter = vertices
            .iter()
            .flat_map(|&a| vertices.iter().map(move |&b| (a, b)))
            .map(|(a, b)| {
                let d = na::Vector3::from(positions[a]) - na::Vector3::from(positions[b]);
                d.norm()
            })
            .fold(0.0, f64::max);

        let mut stiffness = na::DMatrix::zeros(3 * n, 3 * n);
        let mut mass = na::DMatrix::zeros(n, n);
        let mut body_force = vec![0.0; 3 * n];
        let mut grads = vec![na::Vector3::zeros(); n];

        for q in 0..tab.len() {
            let mut jac = na::Matrix3::zeros();
            for (v, dg) in vertices.iter().zip(tab.geometry_grads[q].iter()) {
                jac += na::Vector3::from(positions[*v]) * na::RowVector3::from(*dg);
            }
            let det = jac.determinant();
            if det.abs() <= DEGENERATE_TOLERANCE * diameter.powi(3) {
                return Err(AssemblyError::DegenerateElement { cell, det });
            }
            if det < 0.0 {
                return Err(AssemblyError::InvertedElement { cell, det });
            }
            let jac_inv_t = jac
                .try_inverse()
                .ok_or(AssemblyError::DegenerateElement { cell, det })?
                .transpose();
            for (g, dn) in grads.iter_mut().zip(tab.grads[q].iter()) {
                *g = jac_inv_t * na::Vector3::from(*dn);
            }
            let dv = tab.weights[q] * det;
            let values = &tab.values[q];

            for a in 0..n {
                for b in 0..n {
                    mass[(a, b)] += density * values[a] * values[b] * dv;
                    let (ga, gb) = (&grads[a], &grads[b]);
                    let dot = ga.dot(gb);
                    for i in 0..3 {
                        for j in 0..3 {
                            let mut v = lambda * ga[i] * gb[j] + mu * ga[j] * gb[i];
                            if i == j {
                                v += mu * dot;
                            }
                            stiffness[(3 * a + i, 3 * b + j)] += v * dv;
                        }
                    }
                }
                for i in 0..3 {
                    body_force[3 * a + i] += density * gravity[i] * values[a] * dv;
                }
            }
        }

        // Exact symmetry keeps the assembled operators symmetric bit for bit.
        let stiffness = (&stiffness + stiffness.transpose()) * 0.5;
        let mass = (&mass + mass.transpose()) * 0.5;

        Ok(Local {
            stiffness,
            mass,
            body_force,
        })
    }

    /// Adds Neumann tractions and point forces on unconstrained DOFs.
    fn add_boundary_loads(
        &self,
        bcs: &BoundaryConditions,
        constrained: &[Option<f64>],
        load: &mut [f64],
    ) -> Result<(), AssemblyError> {
        let positions = self.mesh.nodes();
        for (face, data) in self.mesh.faces().iter().enumerate() {
            let (pressure, polarity) = match bcs.get(data.material) {
                Some(Constraint::Neumann { pressure, polarity }) => (*pressure, *polarity),
                _ => continue,
            };
            let owner = self.mesh.face_owner(face);
            let interior = na::Vector3::from(self.mesh.centroid(&self.mesh.cells()[owner].nodes));
            let center = na::Vector3::from(self.mesh.centroid(&data.nodes));
            let outside = center - interior;

            let tab = self.face_tabulation(face);
            let nodes = self.dof_map.face_nodes(face);
            let scale = pressure * polarity.sign();
            for q in 0..tab.len() {
                let mut t = [na::Vector3::zeros(), na::Vector3::zeros()];
                for (v, dg) in data.nodes.iter().zip(tab.geometry_grads[q].iter()) {
                    let x = na::Vector3::from(positions[*v]);
                    t[0] += x * dg[0];
                    t[1] += x * dg[1];
                }
                // Area weighted normal.
                let mut normal = t[0].cross(&t[1]);
                if normal.norm() == 0.0 {
                    return Err(AssemblyError::DegenerateFace { face });
                }
                if normal.dot(&outside) < 0.0 {
                    normal = -normal;
                }
                let w = tab.weights[q] * scale;
                for (&node, &value) in nodes.iter().zip(tab.values[q].iter()) {
                    for c in 0..3 {
                        let dof = DofMap::dof(node, c);
                        if constrained[dof].is_none() {
                            load[dof] += w * value * normal[c];
                        }
                    }
                }
            }
        }

        for pf in bcs.point_forces() {
            for (c, &f) in pf.force.iter().enumerate() {
                let dof = DofMap::dof(pf.node, c);
                if constrained[dof].is_none() {
                    load[dof] += f;
                }
            }
        }
        Ok(())
    }
}
