use rayon::prelude::*;

use super::{blend, check_size, CooMatrix, CsrMatrix, EllMatrix, Kernel, Layout, LinearOperator};
use crate::Error;

/// Accumulates matrix entries during assembly.
///
/// Duplicate `(row, col)` contributions are summed when the builder is finalized.
#[derive(Debug)]
pub struct TripletBuilder {
    triplets: sprs::TriMat<f64>,
}

impl TripletBuilder {
    pub fn new(size: usize) -> Self {
        TripletBuilder {
            triplets: sprs::TriMat::new((size, size)),
        }
    }

    pub fn with_capacity(size: usize, capacity: usize) -> Self {
        TripletBuilder {
            triplets: sprs::TriMat::with_capacity((size, size), capacity),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.triplets.rows()
    }

    /// Accumulate `value` into entry `(row, col)`.
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.size() && col < self.size());
        self.triplets.add_triplet(row, col, value);
    }

    /// Sum duplicates and store the result in the requested layout.
    pub fn finalize(&self, layout: Layout, kernel: Kernel) -> SparseMatrix {
        let csr: sprs::CsMat<f64> = self.triplets.to_csr();
        SparseMatrix::from_csr(CsrMatrix::from_sprs(&csr), layout, kernel)
    }
}

/// Concrete storage behind a [`SparseMatrix`].
#[derive(Clone, Debug, PartialEq)]
pub enum Storage {
    Dense(na::DMatrix<f64>),
    Csr(CsrMatrix),
    Coo(CooMatrix),
    Ell(EllMatrix),
}

/// A finalized square matrix with a fixed dimension, storage layout and product kernel.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseMatrix {
    storage: Storage,
    kernel: Kernel,
}

impl SparseMatrix {
    /// Build a matrix from `(row, col, value)` triplets. Duplicates are summed.
    pub fn from_triplets(
        size: usize,
        triplets: &[(usize, usize, f64)],
        layout: Layout,
        kernel: Kernel,
    ) -> Result<Self, Error> {
        let mut builder = TripletBuilder::with_capacity(size, triplets.len());
        for &(r, c, v) in triplets {
            if r >= size || c >= size {
                return Err(Error::SizeMismatch {
                    expected: size,
                    actual: r.max(c) + 1,
                });
            }
            builder.add(r, c, v);
        }
        Ok(builder.finalize(layout, kernel))
    }

    /// The identity matrix.
    pub fn identity(size: usize, layout: Layout, kernel: Kernel) -> Self {
        let rows = (0..size).map(|i| vec![(i, 1.0)]).collect();
        Self::from_csr(CsrMatrix::from_rows(rows), layout, kernel)
    }

    pub fn from_csr(csr: CsrMatrix, layout: Layout, kernel: Kernel) -> Self {
        let storage = match layout {
            Layout::Csr => Storage::Csr(csr),
            Layout::Coo => Storage::Coo(CooMatrix::from_csr(&csr)),
            Layout::Ell => Storage::Ell(EllMatrix::from_csr(&csr)),
            Layout::Dense => {
                let mut dense = na::DMatrix::zeros(csr.size, csr.size);
                for (i, j, v) in csr.triplet_iter() {
                    dense[(i, j)] += v;
                }
                Storage::Dense(dense)
            }
        };
        SparseMatrix { storage, kernel }
    }

    #[inline]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn layout(&self) -> Layout {
        match self.storage {
            Storage::Dense(_) => Layout::Dense,
            Storage::Csr(_) => Layout::Csr,
            Storage::Coo(_) => Layout::Coo,
            Storage::Ell(_) => Layout::Ell,
        }
    }

    /// Change the product kernel without touching the stored values.
    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn size(&self) -> usize {
        match &self.storage {
            Storage::Dense(m) => m.nrows(),
            Storage::Csr(m) => m.size,
            Storage::Coo(m) => m.size,
            Storage::Ell(m) => m.size,
        }
    }

    /// Number of stored entries (including explicit zeros and padding).
    pub fn nnz(&self) -> usize {
        match &self.storage {
            Storage::Dense(m) => m.len(),
            Storage::Csr(m) => m.nnz(),
            Storage::Coo(m) => m.nnz(),
            Storage::Ell(m) => m.size * m.width,
        }
    }

    /// Value of entry `(i, j)`; zero if not stored.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        match &self.storage {
            Storage::Dense(m) => m[(i, j)],
            Storage::Csr(m) => m.get(i, j),
            Storage::Coo(m) => m.get(i, j),
            Storage::Ell(m) => m.get(i, j),
        }
    }

    pub fn diagonal(&self) -> Vec<f64> {
        match &self.storage {
            Storage::Dense(m) => m.diagonal().iter().cloned().collect(),
            Storage::Csr(m) => m.diagonal(),
            _ => (0..self.size()).map(|i| self.get(i, i)).collect(),
        }
    }

    /// Converts the stored values into compressed sparse rows, dropping dense zeros.
    pub fn to_csr(&self) -> CsrMatrix {
        match &self.storage {
            Storage::Csr(m) => m.clone(),
            Storage::Coo(m) => m.to_csr(),
            Storage::Ell(m) => m.to_csr(),
            Storage::Dense(m) => {
                let rows = (0..m.nrows())
                    .map(|i| {
                        (0..m.ncols())
                            .filter(|&j| m[(i, j)] != 0.0 || i == j)
                            .map(|j| (j, m[(i, j)]))
                            .collect()
                    })
                    .collect();
                CsrMatrix::from_rows(rows)
            }
        }
    }

    /// Multiplies every entry by `alpha`.
    pub fn scale(&mut self, alpha: f64) {
        match &mut self.storage {
            Storage::Dense(m) => *m *= alpha,
            Storage::Csr(m) => m.vals.iter_mut().for_each(|v| *v *= alpha),
            Storage::Coo(m) => m.vals.iter_mut().for_each(|v| *v *= alpha),
            Storage::Ell(m) => m.vals.iter_mut().for_each(|v| *v *= alpha),
        }
    }

    /// Computes `self = self + alpha * other` without going back to element data.
    ///
    /// The result keeps the layout and kernel of `self`. The sparsity pattern becomes the union
    /// of both patterns.
    pub fn scale_and_add(&mut self, alpha: f64, other: &SparseMatrix) -> Result<(), Error> {
        check_size(self.size(), other.size())?;
        if let (Storage::Dense(a), Storage::Dense(b)) = (&mut self.storage, &other.storage) {
            *a += b * alpha;
            return Ok(());
        }
        let lhs = self.to_csr();
        let rhs = other.to_csr();
        let rows = (0..lhs.size)
            .map(|i| merge_rows(lhs.row(i), rhs.row(i), alpha))
            .collect();
        *self = Self::from_csr(CsrMatrix::from_rows(rows), self.layout(), self.kernel);
        Ok(())
    }

    /// Returns `true` if `|a_ij - a_ji| <= tol * max|a|` for all entries.
    pub fn is_symmetric(&self, tol: f64) -> bool {
        let csr = self.to_csr();
        let scale = csr.vals.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let symmetric = csr
            .triplet_iter()
            .all(|(i, j, v)| (v - csr.get(j, i)).abs() <= tol * scale);
        symmetric
    }

    fn dense_apply_scaled(&self, m: &na::DMatrix<f64>, alpha: f64, x: &[f64], beta: f64, y: &mut [f64]) {
        match self.kernel {
            Kernel::Blas => {
                let x: na::DVectorView<f64> = x.into();
                if beta == 0.0 {
                    y.iter_mut().for_each(|y| *y = 0.0);
                }
                let mut y: na::DVectorViewMut<f64> = y.into();
                y.gemv(alpha, m, &x, beta);
            }
            Kernel::Naive => {
                for (i, y) in y.iter_mut().enumerate() {
                    let sum: f64 = (0..m.ncols()).map(|j| m[(i, j)] * x[j]).sum();
                    blend(y, alpha, sum, beta);
                }
            }
            Kernel::Threaded => {
                y.par_iter_mut().enumerate().for_each(|(i, y)| {
                    let sum: f64 = (0..m.ncols()).map(|j| m[(i, j)] * x[j]).sum();
                    blend(y, alpha, sum, beta);
                });
            }
        }
    }
}

impl LinearOperator for SparseMatrix {
    #[inline]
    fn size(&self) -> usize {
        SparseMatrix::size(self)
    }

    fn apply_scaled(&self, alpha: f64, x: &[f64], beta: f64, y: &mut [f64]) -> Result<(), Error> {
        let n = self.size();
        check_size(n, x.len())?;
        check_size(n, y.len())?;
        match &self.storage {
            Storage::Dense(m) => self.dense_apply_scaled(m, alpha, x, beta, y),
            Storage::Csr(m) => m.apply_scaled(self.kernel, alpha, x, beta, y),
            Storage::Coo(m) => m.apply_scaled(self.kernel, alpha, x, beta, y),
            Storage::Ell(m) => m.apply_scaled(self.kernel, alpha, x, beta, y),
        }
        Ok(())
    }

    #[inline]
    fn kernel(&self) -> Kernel {
        self.kernel
    }
}

/// Merge two sorted sparse rows computing `a + alpha * b`.
fn merge_rows(a: (&[usize], &[f64]), b: (&[usize], &[f64]), alpha: f64) -> Vec<(usize, f64)> {
    let (a_cols, a_vals) = a;
    let (b_cols, b_vals) = b;
    let mut out = Vec::with_capacity(a_cols.len() + b_cols.len());
    let (mut p, mut q) = (0, 0);
    while p < a_cols.len() || q < b_cols.len() {
        if q == b_cols.len() || (p < a_cols.len() && a_cols[p] < b_cols[q]) {
            out.push((a_cols[p], a_vals[p]));
            p += 1;
        } else if p == a_cols.len() || b_cols[q] < a_cols[p] {
            out.push((b_cols[q], alpha * b_vals[q]));
            q += 1;
        } else {
            out.push((a_cols[p], a_vals[p] + alpha * b_vals[q]));
            p += 1;
            q += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const LAYOUTS: [Layout; 4] = [Layout::Dense, Layout::Csr, Layout::Coo, Layout::Ell];
    const KERNELS: [Kernel; 3] = [Kernel::Naive, Kernel::Blas, Kernel::Threaded];

    fn sample_triplets() -> Vec<(usize, usize, f64)> {
        vec![
            (0, 0, 4.0),
            (0, 1, -1.0),
            (1, 0, -1.0),
            (1, 1, 4.0),
            (1, 2, -1.0),
            (2, 1, -1.0),
            (2, 2, 2.0),
            // Duplicate contribution is summed.
            (2, 2, 2.0),
            (3, 3, 1.0),
        ]
    }

    #[test]
    fn duplicates_are_summed() {
        let m = SparseMatrix::from_triplets(4, &sample_triplets(), Layout::Csr, Kernel::Naive)
            .unwrap();
        assert_eq!(m.get(2, 2), 4.0);
        assert_eq!(m.diagonal(), vec![4.0, 4.0, 4.0, 1.0]);
        assert!(m.is_symmetric(0.0));
    }

    #[test]
    fn layouts_and_kernels_agree() {
        let x = vec![1.0, 2.0, -1.0, 0.5];
        let reference = {
            let m = SparseMatrix::from_triplets(4, &sample_triplets(), Layout::Csr, Kernel::Naive)
                .unwrap();
            let mut y = vec![0.0; 4];
            m.apply(&x, &mut y).unwrap();
            y
        };
        assert_eq!(reference, vec![2.0, 8.0, -6.0, 0.5]);
        for layout in LAYOUTS {
            for kernel in KERNELS {
                let m = SparseMatrix::from_triplets(4, &sample_triplets(), layout, kernel).unwrap();
                let mut y = vec![f64::NAN; 4];
                m.apply(&x, &mut y).unwrap();
                for (a, b) in y.iter().zip(reference.iter()) {
                    assert_relative_eq!(a, b);
                }
                assert_eq!(m.diagonal(), vec![4.0, 4.0, 4.0, 1.0]);
                assert_eq!(m.to_csr().get(1, 2), -1.0);
            }
        }
    }

    #[test]
    fn scaled_apply_accumulates() {
        let m = SparseMatrix::identity(3, Layout::Ell, Kernel::Naive);
        let mut y = vec![1.0, 1.0, 1.0];
        m.apply_scaled(2.0, &[1.0, 2.0, 3.0], 0.5, &mut y).unwrap();
        assert_eq!(y, vec![2.5, 4.5, 6.5]);
    }

    #[test]
    fn scale_and_add_unions_patterns() {
        for layout in LAYOUTS {
            let mut a = SparseMatrix::identity(3, layout, Kernel::Naive);
            let b = SparseMatrix::from_triplets(
                3,
                &[(0, 2, 1.0), (2, 0, 1.0), (1, 1, 3.0)],
                Layout::Csr,
                Kernel::Naive,
            )
            .unwrap();
            a.scale_and_add(2.0, &b).unwrap();
            assert_eq!(a.layout(), layout);
            assert_eq!(a.get(0, 2), 2.0);
            assert_eq!(a.get(2, 0), 2.0);
            assert_eq!(a.get(1, 1), 7.0);
            assert_eq!(a.get(0, 0), 1.0);
        }
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let m = SparseMatrix::identity(3, Layout::Csr, Kernel::Naive);
        let mut y = vec![0.0; 2];
        assert!(matches!(
            m.apply(&[1.0, 2.0, 3.0], &mut y),
            Err(Error::SizeMismatch { expected: 3, actual: 2 })
        ));
        let mut a = SparseMatrix::identity(3, Layout::Csr, Kernel::Naive);
        let b = SparseMatrix::identity(4, Layout::Csr, Kernel::Naive);
        assert!(a.scale_and_add(1.0, &b).is_err());
    }
}
