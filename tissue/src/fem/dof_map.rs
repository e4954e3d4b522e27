//! Degree of freedom numbering.
//!
//! Every node carries three displacement components with global index `3 * node + component`.
//! Degree 1 nodes are the mesh vertices. Degree 2 adds nodes on edges, and for hexahedra on faces
//! and cell interiors, appended after the vertices in the order cells are visited.

use crate::fem::shape::{ElementType, FaceType, TRI_EDGES};
use crate::mesh::{
    hex_lattice_key, quad_lattice_key, sorted_key, Mesh, NodeTable, TET_EDGES,
};

#[derive(Clone, Debug, PartialEq)]
pub struct DofMap {
    degree: u32,
    num_vertices: usize,
    nodes: Vec<[f64; 3]>,
    cell_nodes: Vec<Vec<usize>>,
    cell_types: Vec<ElementType>,
    face_nodes: Vec<Vec<usize>>,
    face_types: Vec<FaceType>,
}

impl DofMap {
    /// Numbers the nodes of `mesh` for the given displacement degree.
    ///
    /// Returns `None` for unsupported degrees.
    pub fn new(mesh: &Mesh, degree: u32) -> Option<DofMap> {
        let mut table = NodeTable::new(mesh.nodes().to_vec());
        let mut cell_nodes = Vec::with_capacity(mesh.num_cells());
        let mut cell_types = Vec::with_capacity(mesh.num_cells());
        for (i, cell) in mesh.cells().iter().enumerate() {
            let ty = ElementType::new(mesh.cell_kind(i), degree)?;
            let v = &cell.nodes;
            let nodes = match ty {
                ElementType::Tet4 | ElementType::Hex8 => v.clone(),
                ElementType::Tet10 => v
                    .iter()
                    .copied()
                    .chain(
                        TET_EDGES
                            .iter()
                            .map(|&[a, b]| table.node(sorted_key([v[a], v[b]].into_iter()))),
                    )
                    .collect(),
                ElementType::Hex27 => (0..27)
                    .map(|l| table.node(hex_lattice_key(v, [l % 3, (l / 3) % 3, l / 9])))
                    .collect(),
            };
            cell_nodes.push(nodes);
            cell_types.push(ty);
        }

        let mut face_nodes = Vec::with_capacity(mesh.faces().len());
        let mut face_types = Vec::with_capacity(mesh.faces().len());
        for (i, face) in mesh.faces().iter().enumerate() {
            let ty = FaceType::new(mesh.face_kind(i), degree)?;
            let v = &face.nodes;
            let nodes = match ty {
                FaceType::Tri3 | FaceType::Quad4 => v.clone(),
                FaceType::Tri6 => v
                    .iter()
                    .copied()
                    .chain(
                        TRI_EDGES
                            .iter()
                            .map(|&[a, b]| table.node(sorted_key([v[a], v[b]].into_iter()))),
                    )
                    .collect(),
                FaceType::Quad9 => (0..9)
                    .map(|l| table.node(quad_lattice_key(v, [l % 3, l / 3])))
                    .collect(),
            };
            face_nodes.push(nodes);
            face_types.push(ty);
        }

        let nodes = table.into_positions();
        log::debug!(
            "DOF map: degree {}, {} nodes, {} DOFs",
            degree,
            nodes.len(),
            3 * nodes.len()
        );

        Some(DofMap {
            degree,
            num_vertices: mesh.num_nodes(),
            nodes,
            cell_nodes,
            cell_types,
            face_nodes,
            face_types,
        })
    }

    pub fn degree(&self) -> u32 {
        self.degree
    }

    /// Number of mesh vertices. These are the first nodes.
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_dofs(&self) -> usize {
        3 * self.nodes.len()
    }

    /// Positions of all nodes.
    pub fn nodes(&self) -> &[[f64; 3]] {
        &self.nodes
    }

    #[inline]
    pub fn dof(node: usize, component: usize) -> usize {
        3 * node + component
    }

    pub fn cell_nodes(&self, cell: usize) -> &[usize] {
        &self.cell_nodes[cell]
    }

    pub fn cell_type(&self, cell: usize) -> ElementType {
        self.cell_types[cell]
    }

    pub fn face_nodes(&self, face: usize) -> &[usize] {
        &self.face_nodes[face]
    }

    pub fn face_type(&self, face: usize) -> FaceType {
        self.face_types[face]
    }

    /// Global DOFs of a cell, node major.
    pub fn cell_dofs(&self, cell: usize) -> Vec<usize> {
        self.cell_nodes[cell]
            .iter()
            .flat_map(|&n| (0..3).map(move |c| DofMap::dof(n, c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn linear_map_uses_vertices() {
        let mesh = make_box([2, 1, 1], [2.0, 1.0, 1.0]);
        let map = DofMap::new(&mesh, 1).unwrap();
        assert_eq!(map.num_nodes(), 12);
        assert_eq!(map.num_dofs(), 36);
        assert_eq!(map.cell_nodes(1), &mesh.cells()[1].nodes[..]);
        assert_eq!(map.cell_dofs(0)[..6], [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn quadratic_hexes_share_entities() {
        let mesh = make_box([2, 1, 1], [2.0, 1.0, 1.0]);
        let map = DofMap::new(&mesh, 2).unwrap();
        // A 5 x 3 x 3 lattice of nodes.
        assert_eq!(map.num_nodes(), 45);
        assert_eq!(map.num_vertices(), 12);
        // The right face lattice of cell 0 equals the left face lattice of cell 1.
        for q in 0..3 {
            for r in 0..3 {
                let right = map.cell_nodes(0)[2 + 3 * q + 9 * r];
                let left = map.cell_nodes(1)[3 * q + 9 * r];
                assert_eq!(right, left);
            }
        }
        let center = map.cell_nodes(0)[13];
        assert_eq!(map.nodes()[center], [0.5, 0.5, 0.5]);
        // Boundary face nodes are nodes of the owning cell.
        for f in 0..mesh.faces().len() {
            let owner = mesh.face_owner(f);
            for n in map.face_nodes(f) {
                assert!(map.cell_nodes(owner).contains(n));
            }
        }
    }

    #[test]
    fn quadratic_tets() {
        let mesh = make_tet_box([1, 1, 1], [1.0, 1.0, 1.0]);
        let map = DofMap::new(&mesh, 2).unwrap();
        // 8 vertices, 12 cube edges, 6 face diagonals and the main diagonal.
        assert_eq!(map.num_nodes(), 8 + 12 + 6 + 1);
        assert!(DofMap::new(&mesh, 3).is_none());
    }
}
