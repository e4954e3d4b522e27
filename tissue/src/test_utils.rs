use crate::boundary::{BoundaryConditions, Polarity};
use crate::config::*;
use crate::mesh::{tet_signed_volume, Cell, Face, Mesh, HEX_CORNERS, HEX_FACES};

/*
 * Setup code
 */

/// Tag of the boundary faces at `x = 0` in the box fixtures.
pub const FIXED_TAG: i32 = 123;
/// Tag of the boundary faces at `x = max` in the box fixtures.
pub const LOADED_TAG: i32 = 126;

/// Boundary tags of the local hexahedron faces in [`HEX_FACES`] order: `z = 0`, `z = 1`,
/// `y = 0`, `x = 1`, `y = 1`, `x = 0`.
const HEX_FACE_TAGS: [i32; 6] = [121, 122, 124, LOADED_TAG, 125, FIXED_TAG];

pub fn make_unit_cube() -> Mesh {
    make_box([1, 1, 1], [1.0, 1.0, 1.0])
}

pub fn make_one_tet_mesh() -> Mesh {
    let nodes = vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
    ];
    let cells = vec![Cell {
        nodes: vec![0, 1, 2, 3],
        material: 0,
    }];
    let faces = vec![
        Face {
            nodes: vec![0, 2, 1],
            material: 1,
        },
        Face {
            nodes: vec![1, 2, 3],
            material: 2,
        },
    ];
    Mesh::new(nodes, cells, faces).unwrap()
}

fn lattice_index(res: [usize; 3], p: [usize; 3]) -> usize {
    p[0] + (res[0] + 1) * (p[1] + (res[1] + 1) * p[2])
}

fn box_nodes(res: [usize; 3], size: [f64; 3]) -> Vec<[f64; 3]> {
    let mut nodes = Vec::with_capacity((res[0] + 1) * (res[1] + 1) * (res[2] + 1));
    for k in 0..=res[2] {
        for j in 0..=res[1] {
            for i in 0..=res[0] {
                nodes.push([
                    size[0] * i as f64 / res[0] as f64,
                    size[1] * j as f64 / res[1] as f64,
                    size[2] * k as f64 / res[2] as f64,
                ]);
            }
        }
    }
    nodes
}

/// Calls `f` with the lattice corner of every cell of the box and, for every boundary face of
/// that cell, the local face index.
fn for_each_box_cell(res: [usize; 3], mut f: impl FnMut([usize; 3], Vec<usize>)) {
    for k in 0..res[2] {
        for j in 0..res[1] {
            for i in 0..res[0] {
                let on_boundary = [
                    k == 0,
                    k + 1 == res[2],
                    j == 0,
                    i + 1 == res[0],
                    j + 1 == res[1],
                    i == 0,
                ];
                let boundary_faces = (0..6).filter(|&f| on_boundary[f]).collect();
                f([i, j, k], boundary_faces);
            }
        }
    }
}

/// Axis aligned box of `res` hexahedra with boundary faces tagged per side.
///
/// The side at `x = 0` carries [`FIXED_TAG`] and the side at `x = size[0]` carries
/// [`LOADED_TAG`].
pub fn make_box(res: [usize; 3], size: [f64; 3]) -> Mesh {
    let nodes = box_nodes(res, size);
    let mut cells = Vec::new();
    let mut faces = Vec::new();
    for_each_box_cell(res, |corner, boundary| {
        let hex: Vec<usize> = HEX_CORNERS
            .iter()
            .map(|c| lattice_index(res, [corner[0] + c[0], corner[1] + c[1], corner[2] + c[2]]))
            .collect();
        for f in boundary {
            faces.push(Face {
                nodes: HEX_FACES[f].iter().map(|&v| hex[v]).collect(),
                material: HEX_FACE_TAGS[f],
            });
        }
        cells.push(Cell {
            nodes: hex,
            material: 0,
        });
    });
    Mesh::new(nodes, cells, faces).unwrap()
}

/// Same box as [`make_box`] with every hexahedron split into 6 tetrahedra around its main
/// diagonal.
pub fn make_tet_box(res: [usize; 3], size: [f64; 3]) -> Mesh {
    const AXIS_ORDERS: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    let nodes = box_nodes(res, size);
    let mut cells = Vec::new();
    let mut faces = Vec::new();
    for_each_box_cell(res, |corner, boundary| {
        for order in AXIS_ORDERS.iter() {
            let mut p = corner;
            let mut tet = vec![lattice_index(res, p)];
            for &axis in order {
                p[axis] += 1;
                tet.push(lattice_index(res, p));
            }
            if tet_signed_volume(&nodes, &tet) < 0.0 {
                tet.swap(1, 2);
            }
            cells.push(Cell {
                nodes: tet,
                material: 0,
            });
        }
        let hex: Vec<usize> = HEX_CORNERS
            .iter()
            .map(|c| lattice_index(res, [corner[0] + c[0], corner[1] + c[1], corner[2] + c[2]]))
            .collect();
        for f in boundary {
            // Split along the diagonal through the lowest corner, matching the tetrahedra.
            let quad = HEX_FACES[f];
            let lowest = (0..4)
                .min_by_key(|&v| HEX_CORNERS[quad[v]].iter().sum::<usize>())
                .unwrap_or(0);
            let q = |i: usize| hex[quad[(lowest + i) % 4]];
            for tri in [[q(0), q(1), q(2)], [q(0), q(2), q(3)]] {
                faces.push(Face {
                    nodes: tri.to_vec(),
                    material: HEX_FACE_TAGS[f],
                });
            }
        }
    });
    Mesh::new(nodes, cells, faces).unwrap()
}

/// Soft material that keeps the lowest vibration period of the unit fixtures well above a
/// second.
pub fn soft_material() -> ElasticityParams {
    ElasticityParams {
        density: 100.0,
        lambda: 10.0,
        mu: 5.0,
        gravity: 0.0,
        gravity_direction: [0.0, 0.0, -1.0],
    }
}

/// Boundary conditions clamping [`FIXED_TAG`] and pushing on [`LOADED_TAG`].
pub fn clamp_and_push(pressure: f64) -> BoundaryConditions {
    let mut bcs = BoundaryConditions::new();
    bcs.add_dirichlet(FIXED_TAG, [0.0; 3])
        .and_then(|bcs| bcs.add_neumann(LOADED_TAG, pressure, Polarity::Outward))
        .unwrap();
    bcs
}

/// Configuration of the single cube pushed on one side with Newmark time stepping.
pub fn cube_config() -> Config {
    Config {
        elasticity_model: soft_material(),
        instationary: InstationaryParams {
            solve_instationary: true,
            method: Method::Newmark,
            delta_t: 0.1,
            max_time_step_its: 5,
            damping_factor: 1.0,
            rayleigh_alpha: 0.0,
            rayleigh_beta: 0.0,
            ..Default::default()
        },
        boundary: BoundaryParams {
            dirichlet: vec![DirichletTag {
                tag: FIXED_TAG,
                displacement: None,
            }],
            neumann: vec![NeumannTag {
                tag: LOADED_TAG,
                pressure: 40.0,
                polarity: Polarity::Outward,
            }],
        },
        linear_solver: LinearSolverParams {
            solver_name: SolverName::Cg,
            maximum_iterations: 1000,
            absolute_tolerance: 1e-12,
            relative_tolerance: 1e-10,
            preconditioner_name: PreconditionerName::Jacobi,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_fixtures_are_valid() {
        let mesh = make_box([3, 2, 1], [3.0, 2.0, 1.0]);
        assert_eq!(mesh.num_cells(), 6);
        assert_eq!(mesh.num_nodes(), 24);
        assert_eq!(mesh.faces().len(), 2 * (6 + 3 + 2));

        let tets = make_tet_box([2, 2, 2], [1.0, 1.0, 1.0]);
        assert_eq!(tets.num_cells(), 48);
        assert_eq!(tets.faces().len(), 2 * 6 * 4);
        for cell in tets.cells() {
            assert!(tet_signed_volume(tets.nodes(), &cell.nodes) > 0.0);
        }
    }
}
