//! Loading of configuration, boundary data and meshes, and output of displacement snapshots.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::boundary::BcData;
use crate::config::{Config, ConfigError};
use crate::mesh::{CellKind, Mesh, MeshData, MeshError};

fn open(path: &Path) -> Result<BufReader<File>, ConfigError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Reads a whole text file.
pub fn read_text(path: impl AsRef<Path>) -> Result<String, ConfigError> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    Config::from_ron(&read_text(path)?)
}

pub fn load_bc_data(path: impl AsRef<Path>) -> Result<BcData, ConfigError> {
    let f = open(path.as_ref())?;
    Ok(ron::de::from_reader(f)?)
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Loads a mesh from a RON (`.ron`) or bincode (`.bin`) file.
pub fn load_mesh(path: impl AsRef<Path>) -> Result<Mesh, MeshError> {
    let path = path.as_ref();
    let data: MeshData = match extension(path).as_str() {
        "ron" => ron::de::from_reader(BufReader::new(File::open(path)?))?,
        "bin" => bincode::deserialize_from(BufReader::new(File::open(path)?))?,
        other => return Err(MeshError::UnsupportedFormat(other.to_string())),
    };
    let mesh = Mesh::from_data(data)?;
    log::info!(
        "Loaded mesh {:?}: {} nodes, {} cells, {} boundary faces",
        path,
        mesh.num_nodes(),
        mesh.num_cells(),
        mesh.faces().len()
    );
    Ok(mesh)
}

/// Saves a mesh as RON (`.ron`) or bincode (`.bin`) depending on the extension.
pub fn save_mesh(mesh: &Mesh, path: impl AsRef<Path>) -> Result<(), MeshError> {
    let path = path.as_ref();
    let data = mesh.to_data();
    match extension(path).as_str() {
        "ron" => {
            let text = ron::ser::to_string_pretty(&data, ron::ser::PrettyConfig::new())
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(path, text)?;
        }
        "bin" => bincode::serialize_into(BufWriter::new(File::create(path)?), &data)?,
        other => return Err(MeshError::UnsupportedFormat(other.to_string())),
    }
    Ok(())
}

/// Writes `mesh` with the per-vertex `displacement` field as a legacy ASCII VTK file.
pub fn write_vtk(
    path: impl AsRef<Path>,
    mesh: &Mesh,
    displacement: &[[f64; 3]],
    title: &str,
) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    writeln!(w, "# vtk DataFile Version 3.0")?;
    writeln!(w, "{}", title.lines().next().unwrap_or(""))?;
    writeln!(w, "ASCII")?;
    writeln!(w, "DATASET UNSTRUCTURED_GRID")?;
    writeln!(w, "POINTS {} double", mesh.num_nodes())?;
    for p in mesh.nodes() {
        writeln!(w, "{} {} {}", p[0], p[1], p[2])?;
    }

    let size: usize = mesh.cells().iter().map(|c| c.nodes.len() + 1).sum();
    writeln!(w, "CELLS {} {}", mesh.num_cells(), size)?;
    for cell in mesh.cells() {
        write!(w, "{}", cell.nodes.len())?;
        for n in &cell.nodes {
            write!(w, " {}", n)?;
        }
        writeln!(w)?;
    }
    writeln!(w, "CELL_TYPES {}", mesh.num_cells())?;
    for cell in 0..mesh.num_cells() {
        let ty = match mesh.cell_kind(cell) {
            CellKind::Tetrahedron => 10,
            CellKind::Hexahedron => 12,
        };
        writeln!(w, "{}", ty)?;
    }

    writeln!(w, "POINT_DATA {}", mesh.num_nodes())?;
    writeln!(w, "VECTORS displacement double")?;
    for d in displacement.iter().take(mesh.num_nodes()) {
        writeln!(w, "{} {} {}", d[0], d[1], d[2])?;
    }
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn mesh_files_round_trip() {
        let dir = std::env::temp_dir().join(format!("tissue-io-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mesh = make_tet_box([1, 1, 2], [1.0, 1.0, 2.0]);
        for name in ["box.ron", "box.bin"] {
            let path = dir.join(name);
            save_mesh(&mesh, &path).unwrap();
            assert_eq!(load_mesh(&path).unwrap(), mesh);
        }
        assert!(matches!(
            load_mesh(dir.join("box.obj")),
            Err(MeshError::UnsupportedFormat(_))
        ));

        let vtk = dir.join("box.vtk");
        let displacement = vec![[0.0, 0.0, 1.0]; mesh.num_nodes()];
        write_vtk(&vtk, &mesh, &displacement, "test").unwrap();
        let text = std::fs::read_to_string(&vtk).unwrap();
        assert!(text.contains(&format!("CELLS {} {}", mesh.num_cells(), mesh.num_cells() * 5)));
        assert!(text.contains("VECTORS displacement double"));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_config_is_reported_with_path() {
        match load_config("/nonexistent/tissue.ron") {
            Err(ConfigError::Io { path, .. }) => {
                assert_eq!(path, Path::new("/nonexistent/tissue.ron"))
            }
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }
}
