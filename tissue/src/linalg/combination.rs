use super::{check_size, Kernel, LinearOperator, SparseMatrix};
use crate::Error;

/// A lazy linear combination `sum_i c_i A_i` of borrowed matrices.
///
/// Products are evaluated term by term, so changing a coefficient never requires
/// re-assembling or re-combining the underlying operators.
#[derive(Clone, Debug)]
pub struct LinearCombination<'a> {
    terms: Vec<(f64, &'a SparseMatrix)>,
    size: usize,
    kernel: Kernel,
}

impl<'a> LinearCombination<'a> {
    /// Builds a combination from `(coefficient, matrix)` pairs. Terms with a zero coefficient
    /// are skipped.
    pub fn new(terms: impl IntoIterator<Item = (f64, &'a SparseMatrix)>) -> Result<Self, Error> {
        let all: Vec<_> = terms.into_iter().collect();
        let first = all.first().ok_or(Error::SizeMismatch {
            expected: 1,
            actual: 0,
        })?;
        let size = first.1.size();
        let kernel = first.1.kernel();
        for (_, m) in all.iter() {
            check_size(size, m.size())?;
        }
        let terms = all.into_iter().filter(|(c, _)| *c != 0.0).collect();
        Ok(LinearCombination {
            terms,
            size,
            kernel,
        })
    }

    pub fn terms(&self) -> &[(f64, &'a SparseMatrix)] {
        &self.terms
    }

    /// Diagonal of the combination.
    pub fn diagonal(&self) -> Vec<f64> {
        let mut diag = vec![0.0; self.size];
        for (c, m) in self.terms.iter() {
            for (d, v) in diag.iter_mut().zip(m.diagonal()) {
                *d += c * v;
            }
        }
        diag
    }

    /// Explicitly forms the combination as a single matrix with the layout of the first term.
    ///
    /// This is needed by preconditioners that inspect individual entries.
    pub fn to_matrix(&self) -> Result<SparseMatrix, Error> {
        let mut iter = self.terms.iter();
        let mut out = match iter.next() {
            Some((c, m)) => {
                let mut out = (*m).clone();
                out.scale(*c);
                out
            }
            None => {
                let mut zero = SparseMatrix::identity(self.size, Default::default(), self.kernel);
                zero.scale(0.0);
                return Ok(zero);
            }
        };
        for (c, m) in iter {
            out.scale_and_add(*c, m)?;
        }
        Ok(out)
    }
}

impl LinearOperator for LinearCombination<'_> {
    #[inline]
    fn size(&self) -> usize {
        self.size
    }

    fn apply_scaled(&self, alpha: f64, x: &[f64], beta: f64, y: &mut [f64]) -> Result<(), Error> {
        check_size(self.size, x.len())?;
        check_size(self.size, y.len())?;
        let mut beta = beta;
        for (c, m) in self.terms.iter() {
            m.apply_scaled(alpha * c, x, beta, y)?;
            beta = 1.0;
        }
        if beta == 0.0 {
            // No terms: the combination is the zero operator.
            y.iter_mut().for_each(|y| *y = 0.0);
        }
        Ok(())
    }

    #[inline]
    fn kernel(&self) -> Kernel {
        self.kernel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::Layout;
    use approx::assert_relative_eq;

    #[test]
    fn lazy_and_eager_combinations_agree() {
        let m = SparseMatrix::from_triplets(
            3,
            &[(0, 0, 2.0), (1, 1, 2.0), (2, 2, 2.0), (0, 1, 0.5), (1, 0, 0.5)],
            Layout::Csr,
            Kernel::Naive,
        )
        .unwrap();
        let k = SparseMatrix::from_triplets(
            3,
            &[(0, 0, 1.0), (1, 1, 2.0), (2, 2, 3.0), (1, 2, -1.0), (2, 1, -1.0)],
            Layout::Coo,
            Kernel::Naive,
        )
        .unwrap();
        let combo = LinearCombination::new(vec![(3.0, &m), (0.5, &k), (0.0, &k)]).unwrap();
        assert_eq!(combo.terms().len(), 2);

        let x = [1.0, -2.0, 0.5];
        let mut lazy = vec![0.0; 3];
        combo.apply(&x, &mut lazy).unwrap();

        let eager = combo.to_matrix().unwrap();
        let mut y = vec![0.0; 3];
        eager.apply(&x, &mut y).unwrap();

        for (a, b) in lazy.iter().zip(y.iter()) {
            assert_relative_eq!(a, b, max_relative = 1e-14);
        }
        let diag = combo.diagonal();
        assert_relative_eq!(diag[0], 6.5);
        assert_relative_eq!(diag[2], 7.5);
        for (a, b) in eager.diagonal().iter().zip(diag.iter()) {
            assert_relative_eq!(a, b);
        }
    }

    #[test]
    fn mismatched_terms_are_rejected() {
        let a = SparseMatrix::identity(2, Layout::Csr, Kernel::Naive);
        let b = SparseMatrix::identity(3, Layout::Csr, Kernel::Naive);
        assert!(LinearCombination::new(vec![(1.0, &a), (1.0, &b)]).is_err());
    }
}
