use super::*;

/// Uniformly refines the mesh `levels` times.
///
/// Hexahedra split into 8 children through edge, face and cell midpoints, tetrahedra into 8
/// children (4 corner tets and 4 from the inner octahedron) and boundary faces into 4 children
/// that keep the parent tag. Original nodes keep their indices.
pub fn refine_uniform(mesh: &Mesh, levels: u32) -> Result<Mesh, MeshError> {
    let mut mesh = mesh.clone();
    for level in 0..levels {
        mesh = refine_once(&mesh)?;
        log::debug!(
            "Refinement level {}: {} nodes, {} cells",
            level + 1,
            mesh.num_nodes(),
            mesh.num_cells()
        );
    }
    Ok(mesh)
}

fn refine_once(mesh: &Mesh) -> Result<Mesh, MeshError> {
    let mut table = NodeTable::new(mesh.nodes().to_vec());
    let mut cells = Vec::with_capacity(8 * mesh.num_cells());

    for (cell_idx, cell) in mesh.cells().iter().enumerate() {
        match mesh.cell_kind(cell_idx) {
            CellKind::Hexahedron => {
                let mut lattice = [[[0; 3]; 3]; 3];
                for (i, plane) in lattice.iter_mut().enumerate() {
                    for (j, row) in plane.iter_mut().enumerate() {
                        for (k, node) in row.iter_mut().enumerate() {
                            *node = table.node(hex_lattice_key(&cell.nodes, [i, j, k]));
                        }
                    }
                }
                for offset in HEX_CORNERS.iter() {
                    let nodes = HEX_CORNERS
                        .iter()
                        .map(|c| lattice[offset[0] + c[0]][offset[1] + c[1]][offset[2] + c[2]])
                        .collect();
                    cells.push(Cell {
                        nodes,
                        material: cell.material,
                    });
                }
            }
            CellKind::Tetrahedron => {
                let v = &cell.nodes;
                let mut mid = |a: usize, b: usize| table.node(sorted_key([v[a], v[b]].into_iter()));
                let (m01, m02, m03) = (mid(0, 1), mid(0, 2), mid(0, 3));
                let (m12, m13, m23) = (mid(1, 2), mid(1, 3), mid(2, 3));
                let children = [
                    [v[0], m01, m02, m03],
                    [m01, v[1], m12, m13],
                    [m02, m12, v[2], m23],
                    [m03, m13, m23, v[3]],
                    [m01, m02, m03, m13],
                    [m01, m02, m12, m13],
                    [m02, m03, m13, m23],
                    [m02, m12, m13, m23],
                ];
                for child in children {
                    cells.push(Cell {
                        nodes: child.to_vec(),
                        material: cell.material,
                    });
                }
            }
        }
    }

    let mut faces = Vec::with_capacity(4 * mesh.faces().len());
    for (face_idx, face) in mesh.faces().iter().enumerate() {
        let v = &face.nodes;
        let children: Vec<Vec<usize>> = match mesh.face_kind(face_idx) {
            FaceKind::Quadrilateral => {
                let mut lattice = [[0; 3]; 3];
                for (i, row) in lattice.iter_mut().enumerate() {
                    for (j, node) in row.iter_mut().enumerate() {
                        *node = table.node(quad_lattice_key(v, [i, j]));
                    }
                }
                QUAD_CORNERS
                    .iter()
                    .map(|o| {
                        QUAD_CORNERS
                            .iter()
                            .map(|c| lattice[o[0] + c[0]][o[1] + c[1]])
                            .collect()
                    })
                    .collect()
            }
            FaceKind::Triangle => {
                let mut mid = |a: usize, b: usize| table.node(sorted_key([v[a], v[b]].into_iter()));
                let (m01, m12, m20) = (mid(0, 1), mid(1, 2), mid(2, 0));
                vec![
                    vec![v[0], m01, m20],
                    vec![m01, v[1], m12],
                    vec![m20, m12, v[2]],
                    vec![m01, m12, m20],
                ]
            }
        };
        faces.extend(children.into_iter().map(|nodes| Face {
            nodes,
            material: face.material,
        }));
    }

    let nodes = table.into_positions();

    // Inner octahedron children are not consistently oriented.
    for cell in cells.iter_mut().filter(|c| c.nodes.len() == 4) {
        if tet_signed_volume(&nodes, &cell.nodes) < 0.0 {
            cell.nodes.swap(1, 2);
        }
    }

    Mesh::new(nodes, cells, faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use approx::assert_relative_eq;

    fn total_tet_volume(mesh: &Mesh) -> f64 {
        mesh.cells()
            .iter()
            .map(|c| tet_signed_volume(mesh.nodes(), &c.nodes))
            .sum()
    }

    #[test]
    fn hex_refinement_counts() {
        let cube = make_unit_cube();
        let fine = refine_uniform(&cube, 1).unwrap();
        assert_eq!(fine.num_cells(), 8);
        assert_eq!(fine.num_nodes(), 27);
        assert_eq!(fine.faces().len(), 24);
        assert_eq!(fine.boundary_tags(), cube.boundary_tags());

        let finer = refine_uniform(&cube, 2).unwrap();
        assert_eq!(finer.num_cells(), 64);
        assert_eq!(finer.num_nodes(), 125);
        assert_eq!(finer.faces().len(), 96);
    }

    #[test]
    fn tet_refinement_preserves_volume_and_orientation() {
        let mesh = make_one_tet_mesh();
        let fine = refine_uniform(&mesh, 2).unwrap();
        assert_eq!(fine.num_cells(), 64);
        for cell in fine.cells() {
            assert!(tet_signed_volume(fine.nodes(), &cell.nodes) > 0.0);
        }
        assert_relative_eq!(total_tet_volume(&fine), total_tet_volume(&mesh), epsilon = 1e-14);
        // 4 vertices and 6 edge midpoints.
        assert_eq!(refine_uniform(&mesh, 1).unwrap().num_nodes(), 10);
    }

    #[test]
    fn zero_levels_is_identity() {
        let cube = make_unit_cube();
        assert_eq!(refine_uniform(&cube, 0).unwrap(), cube);
    }
}
