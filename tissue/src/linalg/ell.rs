use rayon::prelude::*;

use super::{blend, CsrMatrix, Kernel};

/// ELLPACK storage.
///
/// Every row stores exactly `width` entries. Short rows are padded with zero values whose column
/// index points at the row itself, which keeps gathers in bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct EllMatrix {
    pub(crate) size: usize,
    pub(crate) width: usize,
    pub(crate) cols: Vec<usize>,
    pub(crate) vals: Vec<f64>,
}

impl EllMatrix {
    pub fn from_csr(csr: &CsrMatrix) -> Self {
        let size = csr.size;
        let width = (0..size)
            .map(|i| csr.row_offsets[i + 1] - csr.row_offsets[i])
            .max()
            .unwrap_or(0);
        let mut cols = Vec::with_capacity(size * width);
        let mut vals = Vec::with_capacity(size * width);
        for i in 0..size {
            let (row_cols, row_vals) = csr.row(i);
            cols.extend_from_slice(row_cols);
            vals.extend_from_slice(row_vals);
            for _ in row_cols.len()..width {
                cols.push(i);
                vals.push(0.0);
            }
        }
        EllMatrix {
            size,
            width,
            cols,
            vals,
        }
    }

    pub fn to_csr(&self) -> CsrMatrix {
        let rows = (0..self.size)
            .map(|i| {
                let mut row: Vec<(usize, f64)> = self
                    .row(i)
                    .filter(|&(j, v)| v != 0.0 || j == i)
                    .collect();
                row.sort_by_key(|&(j, _)| j);
                row.dedup_by(|b, a| {
                    if a.0 == b.0 {
                        a.1 += b.1;
                        true
                    } else {
                        false
                    }
                });
                row
            })
            .collect();
        CsrMatrix::from_rows(rows)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = i * self.width..(i + 1) * self.width;
        self.cols[range.clone()]
            .iter()
            .cloned()
            .zip(self.vals[range].iter().cloned())
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.row(i).filter(|&(c, _)| c == j).map(|(_, v)| v).sum()
    }

    pub(crate) fn apply_scaled(
        &self,
        kernel: Kernel,
        alpha: f64,
        x: &[f64],
        beta: f64,
        y: &mut [f64],
    ) {
        let row_dot = |i: usize| -> f64 { self.row(i).map(|(j, v)| v * x[j]).sum() };
        match kernel {
            Kernel::Naive | Kernel::Blas => {
                for (i, y) in y.iter_mut().enumerate() {
                    blend(y, alpha, row_dot(i), beta);
                }
            }
            Kernel::Threaded => {
                y.par_iter_mut()
                    .enumerate()
                    .for_each(|(i, y)| blend(y, alpha, row_dot(i), beta));
            }
        }
    }
}
