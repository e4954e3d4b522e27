#![allow(dead_code)]

use std::path::PathBuf;

pub use tissue::test_utils::*;
use tissue::Mesh;

pub fn init_logger() {
    let _ = env_logger::Builder::from_env("TISSUE_LOG")
        .is_test(true)
        .try_init();
}

/// A fresh scratch directory unique to this process and `name`.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tissue-test-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Vertices on boundary faces carrying `tag`.
pub fn tagged_vertices(mesh: &Mesh, tag: i32) -> Vec<usize> {
    let mut vertices: Vec<usize> = mesh
        .faces()
        .iter()
        .filter(|f| f.material == tag)
        .flat_map(|f| f.nodes.iter().cloned())
        .collect();
    vertices.sort_unstable();
    vertices.dedup();
    vertices
}

/// Average displacement over `vertices`.
pub fn mean_displacement(displacements: &[[f64; 3]], vertices: &[usize]) -> [f64; 3] {
    let mut mean = [0.0; 3];
    for &v in vertices {
        for c in 0..3 {
            mean[c] += displacements[v][c];
        }
    }
    let n = vertices.len().max(1) as f64;
    [mean[0] / n, mean[1] / n, mean[2] / n]
}

pub fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Residual norm `|b - A x|` relative to `|b|`.
pub fn relative_residual(a: &tissue::linalg::SparseMatrix, b: &[f64], x: &[f64]) -> f64 {
    use tissue::linalg::LinearOperator;
    let mut r = b.to_vec();
    a.apply_scaled(-1.0, x, 1.0, &mut r).unwrap();
    let norm = |v: &[f64]| v.iter().map(|x| x * x).sum::<f64>().sqrt();
    norm(&r) / norm(b)
}
