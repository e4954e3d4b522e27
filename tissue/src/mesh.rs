//! Index based volumetric mesh.
//!
//! Cells are linear tetrahedra or trilinear hexahedra in VTK node ordering. Boundary faces carry
//! the material tags referenced by boundary conditions. A mesh is immutable once validated.

mod refine;

pub use refine::refine_uniform;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Mesh has no cells")]
    Empty,
    #[error("Cell {cell} has {arity} nodes; expected 4 (tetrahedron) or 8 (hexahedron)")]
    CellArity { cell: usize, arity: usize },
    #[error("Boundary face {face} has {arity} nodes; expected 3 (triangle) or 4 (quadrilateral)")]
    FaceArity { face: usize, arity: usize },
    #[error("Node index {node} in {entity} {index} is out of range (mesh has {num_nodes} nodes)")]
    NodeOutOfRange {
        entity: &'static str,
        index: usize,
        node: usize,
        num_nodes: usize,
    },
    #[error("Node {node} is repeated in {entity} {index}")]
    RepeatedNode {
        entity: &'static str,
        index: usize,
        node: usize,
    },
    #[error("Boundary face {face} is not a face of any cell")]
    OrphanFace { face: usize },
    #[error("Boundary tag {tag} is not carried by any boundary face")]
    UnknownTag { tag: i32 },
    #[error("No mesh vertex within {tolerance:e} of point {point:?}")]
    PointNotFound { point: [f64; 3], tolerance: f64 },
    #[error("Unsupported mesh file extension: {0:?}")]
    UnsupportedFormat(String),
    #[error("Failed to read mesh: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse mesh: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("Failed to decode binary mesh: {0}")]
    Decode(#[from] bincode::Error),
}

/// Kind of a volumetric cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    Tetrahedron,
    Hexahedron,
}

/// Kind of a boundary face.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceKind {
    Triangle,
    Quadrilateral,
}

/// Local faces of a tetrahedron, each wound so its normal points out of a positively oriented
/// cell.
pub const TET_FACES: [[usize; 3]; 4] = [[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]];

/// Local edges of a tetrahedron.
pub const TET_EDGES: [[usize; 2]; 6] = [[0, 1], [1, 2], [0, 2], [0, 3], [1, 3], [2, 3]];

/// Local faces of a hexahedron in VTK ordering with outward winding.
pub const HEX_FACES: [[usize; 4]; 6] = [
    [0, 3, 2, 1],
    [4, 5, 6, 7],
    [0, 1, 5, 4],
    [1, 2, 6, 5],
    [2, 3, 7, 6],
    [3, 0, 4, 7],
];

/// Reference coordinates of hexahedron corners in VTK ordering.
pub const HEX_CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Reference coordinates of quadrilateral corners.
pub const QUAD_CORNERS: [[usize; 2]; 4] = [[0, 0], [1, 0], [1, 1], [0, 1]];

impl CellKind {
    pub fn from_arity(arity: usize) -> Option<CellKind> {
        match arity {
            4 => Some(CellKind::Tetrahedron),
            8 => Some(CellKind::Hexahedron),
            _ => None,
        }
    }

    pub fn num_vertices(self) -> usize {
        match self {
            CellKind::Tetrahedron => 4,
            CellKind::Hexahedron => 8,
        }
    }

    /// Calls `f` with the local vertex indices of every face of this cell kind.
    pub fn for_each_face(self, mut f: impl FnMut(&[usize])) {
        match self {
            CellKind::Tetrahedron => TET_FACES.iter().for_each(|face| f(face)),
            CellKind::Hexahedron => HEX_FACES.iter().for_each(|face| f(face)),
        }
    }
}

impl FaceKind {
    pub fn from_arity(arity: usize) -> Option<FaceKind> {
        match arity {
            3 => Some(FaceKind::Triangle),
            4 => Some(FaceKind::Quadrilateral),
            _ => None,
        }
    }
}

/// A volumetric cell with its material tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub nodes: Vec<usize>,
    #[serde(default)]
    pub material: i32,
}

/// A tagged boundary face.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub nodes: Vec<usize>,
    pub material: i32,
}

/// Serialized mesh representation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub nodes: Vec<[f64; 3]>,
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub boundary: Vec<Face>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    nodes: Vec<[f64; 3]>,
    cells: Vec<Cell>,
    faces: Vec<Face>,
    /// Owning cell of each boundary face.
    face_owners: Vec<usize>,
}

impl Mesh {
    /// Validates the given data and builds a mesh.
    pub fn new(nodes: Vec<[f64; 3]>, cells: Vec<Cell>, faces: Vec<Face>) -> Result<Mesh, MeshError> {
        if cells.is_empty() {
            return Err(MeshError::Empty);
        }

        let num_nodes = nodes.len();
        let check_nodes = |entity, index, ids: &[usize]| -> Result<(), MeshError> {
            for (i, &node) in ids.iter().enumerate() {
                if node >= num_nodes {
                    return Err(MeshError::NodeOutOfRange {
                        entity,
                        index,
                        node,
                        num_nodes,
                    });
                }
                if ids[..i].contains(&node) {
                    return Err(MeshError::RepeatedNode {
                        entity,
                        index,
                        node,
                    });
                }
            }
            Ok(())
        };

        let mut cell_faces = AHashMap::new();
        for (cell_idx, cell) in cells.iter().enumerate() {
            let kind = CellKind::from_arity(cell.nodes.len()).ok_or(MeshError::CellArity {
                cell: cell_idx,
                arity: cell.nodes.len(),
            })?;
            check_nodes("cell", cell_idx, &cell.nodes)?;
            kind.for_each_face(|local| {
                let key = sorted_key(local.iter().map(|&v| cell.nodes[v]));
                cell_faces.entry(key).or_insert(cell_idx);
            });
        }

        let mut face_owners = Vec::with_capacity(faces.len());
        for (face_idx, face) in faces.iter().enumerate() {
            FaceKind::from_arity(face.nodes.len()).ok_or(MeshError::FaceArity {
                face: face_idx,
                arity: face.nodes.len(),
            })?;
            check_nodes("face", face_idx, &face.nodes)?;
            let key = sorted_key(face.nodes.iter().copied());
            let owner = cell_faces
                .get(&key)
                .copied()
                .ok_or(MeshError::OrphanFace { face: face_idx })?;
            face_owners.push(owner);
        }

        log::debug!(
            "Mesh: {} nodes, {} cells, {} boundary faces",
            nodes.len(),
            cells.len(),
            faces.len()
        );

        Ok(Mesh {
            nodes,
            cells,
            faces,
            face_owners,
        })
    }

    pub fn from_data(data: MeshData) -> Result<Mesh, MeshError> {
        Mesh::new(data.nodes, data.cells, data.boundary)
    }

    pub fn to_data(&self) -> MeshData {
        MeshData {
            nodes: self.nodes.clone(),
            cells: self.cells.clone(),
            boundary: self.faces.clone(),
        }
    }

    pub fn nodes(&self) -> &[[f64; 3]] {
        &self.nodes
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cell_kind(&self, cell: usize) -> CellKind {
        // Arity was checked during construction.
        match self.cells[cell].nodes.len() {
            4 => CellKind::Tetrahedron,
            _ => CellKind::Hexahedron,
        }
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn face_kind(&self, face: usize) -> FaceKind {
        match self.faces[face].nodes.len() {
            3 => FaceKind::Triangle,
            _ => FaceKind::Quadrilateral,
        }
    }

    /// Index of the cell that owns the given boundary face.
    pub fn face_owner(&self, face: usize) -> usize {
        self.face_owners[face]
    }

    /// Returns `true` if some boundary face carries the given tag.
    pub fn has_tag(&self, tag: i32) -> bool {
        self.faces.iter().any(|f| f.material == tag)
    }

    /// Sorted list of distinct boundary tags.
    pub fn boundary_tags(&self) -> Vec<i32> {
        let mut tags: Vec<_> = self.faces.iter().map(|f| f.material).collect();
        tags.sort_unstable();
        tags.dedup();
        tags
    }

    /// Arithmetic mean of the given nodes.
    pub fn centroid(&self, ids: &[usize]) -> [f64; 3] {
        centroid(&self.nodes, ids)
    }

    /// Length of the bounding box diagonal.
    pub fn bounding_diameter(&self) -> f64 {
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        for p in &self.nodes {
            for i in 0..3 {
                lo[i] = lo[i].min(p[i]);
                hi[i] = hi[i].max(p[i]);
            }
        }
        (0..3)
            .map(|i| (hi[i] - lo[i]).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Finds the vertex closest to `point`, failing if it is farther than `tolerance`.
    ///
    /// Ties are resolved in favour of the lowest index.
    pub fn nearest_node(&self, point: [f64; 3], tolerance: f64) -> Result<usize, MeshError> {
        let mut best = None;
        let mut best_dist = f64::INFINITY;
        for (i, p) in self.nodes.iter().enumerate() {
            let dist = (0..3).map(|k| (p[k] - point[k]).powi(2)).sum::<f64>();
            if dist < best_dist {
                best_dist = dist;
                best = Some(i);
            }
        }
        match best {
            Some(i) if best_dist.sqrt() <= tolerance => Ok(i),
            _ => Err(MeshError::PointNotFound { point, tolerance }),
        }
    }
}

pub(crate) fn centroid(nodes: &[[f64; 3]], ids: &[usize]) -> [f64; 3] {
    let mut c = [0.0; 3];
    for &i in ids {
        for k in 0..3 {
            c[k] += nodes[i][k];
        }
    }
    let n = ids.len() as f64;
    [c[0] / n, c[1] / n, c[2] / n]
}

/// Signed volume of a tetrahedron, positive for the orientation of [`TET_FACES`].
pub fn tet_signed_volume(nodes: &[[f64; 3]], tet: &[usize]) -> f64 {
    let p = |i: usize| na::Vector3::from(nodes[tet[i]]);
    let (e1, e2, e3) = (p(1) - p(0), p(2) - p(0), p(3) - p(0));
    e1.dot(&e2.cross(&e3)) / 6.0
}

pub(crate) fn sorted_key(ids: impl Iterator<Item = usize>) -> Vec<usize> {
    let mut key: Vec<_> = ids.collect();
    key.sort_unstable();
    key
}

/// Vertex set of the sub-entity of a hexahedron containing the lattice point `p` of its
/// `{0, 1, 2}^3` lattice.
///
/// Coordinate 1 denotes a midpoint, so the returned set is a vertex, edge, face or the cell.
pub(crate) fn hex_lattice_key(cell_nodes: &[usize], p: [usize; 3]) -> Vec<usize> {
    sorted_key(
        HEX_CORNERS
            .iter()
            .zip(cell_nodes.iter())
            .filter(|(c, _)| (0..3).all(|i| p[i] == 1 || p[i] == 2 * c[i]))
            .map(|(_, &n)| n),
    )
}

/// Same as [`hex_lattice_key`] for a quadrilateral and its `{0, 1, 2}^2` lattice.
pub(crate) fn quad_lattice_key(face_nodes: &[usize], p: [usize; 2]) -> Vec<usize> {
    sorted_key(
        QUAD_CORNERS
            .iter()
            .zip(face_nodes.iter())
            .filter(|(c, _)| (0..2).all(|i| p[i] == 1 || p[i] == 2 * c[i]))
            .map(|(_, &n)| n),
    )
}

/// Node positions extended by nodes placed at the barycentres of sub-entities.
///
/// A sub-entity is identified by its sorted vertex set, so neighbouring cells sharing an edge or
/// face resolve to the same node.
pub(crate) struct NodeTable {
    positions: Vec<[f64; 3]>,
    index: AHashMap<Vec<usize>, usize>,
}

impl NodeTable {
    pub fn new(positions: Vec<[f64; 3]>) -> Self {
        NodeTable {
            positions,
            index: AHashMap::new(),
        }
    }

    /// Returns the node for the given sorted vertex set, creating it on first use.
    pub fn node(&mut self, key: Vec<usize>) -> usize {
        if key.len() == 1 {
            return key[0];
        }
        let positions = &mut self.positions;
        *self.index.entry(key).or_insert_with_key(|key| {
            let p = centroid(positions, key);
            positions.push(p);
            positions.len() - 1
        })
    }

    pub fn into_positions(self) -> Vec<[f64; 3]> {
        self.positions
    }
}
