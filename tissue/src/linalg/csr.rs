use rayon::prelude::*;

use super::{blend, Kernel};

/// Compressed sparse row matrix with sorted, unique column indices in every row.
#[derive(Clone, Debug, PartialEq)]
pub struct CsrMatrix {
    pub(crate) size: usize,
    pub(crate) row_offsets: Vec<usize>,
    pub(crate) cols: Vec<usize>,
    pub(crate) vals: Vec<f64>,
}

impl CsrMatrix {
    /// Converts an `sprs` compressed matrix in row-major order.
    pub fn from_sprs(mtx: &sprs::CsMat<f64>) -> Self {
        debug_assert!(mtx.is_csr());
        let size = mtx.rows();
        let mut row_offsets = Vec::with_capacity(size + 1);
        let mut cols = Vec::with_capacity(mtx.nnz());
        let mut vals = Vec::with_capacity(mtx.nnz());
        row_offsets.push(0);
        for row in mtx.outer_iterator() {
            let mut entries: Vec<(usize, f64)> = row.iter().map(|(c, &v)| (c, v)).collect();
            entries.sort_by_key(|&(c, _)| c);
            for (c, v) in entries {
                cols.push(c);
                vals.push(v);
            }
            row_offsets.push(cols.len());
        }
        CsrMatrix {
            size,
            row_offsets,
            cols,
            vals,
        }
    }

    /// Builds a matrix from rows of sorted `(col, value)` pairs.
    pub fn from_rows(rows: Vec<Vec<(usize, f64)>>) -> Self {
        let size = rows.len();
        let mut row_offsets = Vec::with_capacity(size + 1);
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        row_offsets.push(0);
        for row in rows {
            debug_assert!(row.windows(2).all(|w| w[0].0 < w[1].0));
            for (c, v) in row {
                cols.push(c);
                vals.push(v);
            }
            row_offsets.push(cols.len());
        }
        CsrMatrix {
            size,
            row_offsets,
            cols,
            vals,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.vals.len()
    }

    /// Column indices and values of the given row.
    #[inline]
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let range = self.row_offsets[i]..self.row_offsets[i + 1];
        (&self.cols[range.clone()], &self.vals[range])
    }

    /// Iterates over the `(col, value)` entries of the given row.
    pub fn row_iter(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (cols, vals) = self.row(i);
        cols.iter().copied().zip(vals.iter().copied())
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> (&[usize], &mut [f64]) {
        let range = self.row_offsets[i]..self.row_offsets[i + 1];
        (&self.cols[range.clone()], &mut self.vals[range])
    }

    /// Position of entry `(i, j)` in the value array if it is structurally present.
    #[inline]
    pub fn position(&self, i: usize, j: usize) -> Option<usize> {
        let (cols, _) = self.row(i);
        cols.binary_search(&j).ok().map(|p| p + self.row_offsets[i])
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.position(i, j).map(|p| self.vals[p]).unwrap_or(0.0)
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.size).map(|i| self.get(i, i)).collect()
    }

    /// Iterates over all stored `(row, col, value)` entries in row-major order.
    pub fn triplet_iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.size).flat_map(move |i| {
            let (cols, vals) = self.row(i);
            cols.iter().zip(vals.iter()).map(move |(&j, &v)| (i, j, v))
        })
    }

    #[inline]
    fn row_dot(&self, i: usize, x: &[f64]) -> f64 {
        let (cols, vals) = self.row(i);
        cols.iter().zip(vals.iter()).map(|(&j, &v)| v * x[j]).sum()
    }

    pub(crate) fn apply_scaled(
        &self,
        kernel: Kernel,
        alpha: f64,
        x: &[f64],
        beta: f64,
        y: &mut [f64],
    ) {
        match kernel {
            Kernel::Naive | Kernel::Blas => {
                for (i, y) in y.iter_mut().enumerate() {
                    blend(y, alpha, self.row_dot(i, x), beta);
                }
            }
            Kernel::Threaded => {
                y.par_iter_mut().enumerate().for_each(|(i, y)| {
                    blend(y, alpha, self.row_dot(i, x), beta);
                });
            }
        }
    }
}
