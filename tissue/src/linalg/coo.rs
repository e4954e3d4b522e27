use rayon::prelude::*;

use super::{blend, CsrMatrix, Kernel};

/// Coordinate storage with entries sorted by row, then column.
///
/// Row starts are kept alongside the triplets so that products can be split into independent row
/// blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct CooMatrix {
    pub(crate) size: usize,
    pub(crate) rows: Vec<usize>,
    pub(crate) cols: Vec<usize>,
    pub(crate) vals: Vec<f64>,
    row_starts: Vec<usize>,
}

impl CooMatrix {
    pub fn from_csr(csr: &CsrMatrix) -> Self {
        let mut rows = Vec::with_capacity(csr.nnz());
        for i in 0..csr.size {
            rows.extend(std::iter::repeat(i).take(csr.row_offsets[i + 1] - csr.row_offsets[i]));
        }
        CooMatrix {
            size: csr.size,
            rows,
            cols: csr.cols.clone(),
            vals: csr.vals.clone(),
            row_starts: csr.row_offsets.clone(),
        }
    }

    pub fn to_csr(&self) -> CsrMatrix {
        CsrMatrix {
            size: self.size,
            row_offsets: self.row_starts.clone(),
            cols: self.cols.clone(),
            vals: self.vals.clone(),
        }
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.vals.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        let range = self.row_starts[i]..self.row_starts[i + 1];
        match self.cols[range.clone()].binary_search(&j) {
            Ok(p) => self.vals[range.start + p],
            Err(_) => 0.0,
        }
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
                if beta == 0.0 {
                    y.iter_mut().for_each(|y| *y = 0.0);
                } else {
                    y.iter_mut().for_each(|y| *y *= beta);
                }
                for ((&i, &j), &v) in self.rows.iter().zip(self.cols.iter()).zip(self.vals.iter()) {
                    y[i] += alpha * v * x[j];
                }
            }
            Kernel::Threaded => {
                y.par_iter_mut().enumerate().for_each(|(i, y)| {
                    let range = self.row_starts[i]..self.row_starts[i + 1];
                    let sum: f64 = self.cols[range.clone()]
                        .iter()
                        .zip(self.vals[range].iter())
                        .map(|(&j, &v)| v * x[j])
                        .sum();
                    blend(y, alpha, sum, beta);
                });
            }
        }
    }
}
