use std::collections::BTreeSet;

use super::{BuildError, Preconditioner};
use crate::linalg::CsrMatrix;

/// Rule deciding which fill-in entries an incomplete factorization keeps.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FillRule {
    /// Keep fill up to the given level. Level zero keeps the sparsity pattern of the matrix.
    Level(usize),
    /// Drop entries smaller than `drop_tolerance` times the row norm and keep at most
    /// `fill_factor` times the row length in each triangular factor.
    Threshold {
        drop_tolerance: f64,
        fill_factor: f64,
    },
}

impl FillRule {
    #[inline]
    fn admits(&self, level: usize) -> bool {
        match *self {
            FillRule::Level(p) => level <= p,
            FillRule::Threshold { .. } => true,
        }
    }

    #[inline]
    fn drops(&self, value: f64, row_norm: f64) -> bool {
        match *self {
            FillRule::Level(_) => false,
            FillRule::Threshold { drop_tolerance, .. } => value.abs() < drop_tolerance * row_norm,
        }
    }

    /// Applies dropping and the fill limit to one triangular part of a factored row.
    fn select(&self, entries: &mut Vec<(usize, f64, usize)>, row_len: usize, row_norm: f64) {
        if let FillRule::Threshold {
            drop_tolerance,
            fill_factor,
        } = *self
        {
            select_largest(entries, drop_tolerance * row_norm, fill_limit(fill_factor, row_len));
        }
    }
}

/// Maximum number of entries kept in one factor of a row of the given length.
pub(crate) fn fill_limit(fill_factor: f64, row_len: usize) -> usize {
    ((fill_factor * row_len as f64).ceil() as usize).max(1)
}

/// Removes entries below `threshold` in magnitude and keeps at most `limit` of the largest,
/// leaving the result sorted by column.
pub(crate) fn select_largest<T>(entries: &mut Vec<(usize, f64, T)>, threshold: f64, limit: usize) {
    entries.retain(|e| e.1.abs() >= threshold);
    if entries.len() > limit {
        entries.sort_by(|a, b| {
            b.1.abs()
                .partial_cmp(&a.1.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        entries.truncate(limit);
        entries.sort_by_key(|e| e.0);
    }
}

/// Euclidean norm of a matrix row.
pub(crate) fn row_norm(matrix: &CsrMatrix, row: usize) -> f64 {
    matrix
        .row_iter(row)
        .map(|(_, v)| v * v)
        .sum::<f64>()
        .sqrt()
}

/// Dense scatter of a single sparse row with fill levels.
pub(crate) struct RowWorkspace {
    values: Vec<f64>,
    levels: Vec<usize>,
    occupied: Vec<bool>,
    columns: Vec<usize>,
}

impl RowWorkspace {
    pub(crate) fn new(size: usize) -> Self {
        RowWorkspace {
            values: vec![0.0; size],
            levels: vec![0; size],
            occupied: vec![false; size],
            columns: Vec::new(),
        }
    }

    /// Scatters a matrix row. All its entries have level zero.
    pub(crate) fn load(&mut self, entries: impl Iterator<Item = (usize, f64)>) {
        for (col, value) in entries {
            self.insert(col, value, 0);
        }
    }

    #[inline]
    pub(crate) fn contains(&self, col: usize) -> bool {
        self.occupied[col]
    }

    #[inline]
    pub(crate) fn value(&self, col: usize) -> f64 {
        self.values[col]
    }

    #[inline]
    pub(crate) fn level(&self, col: usize) -> usize {
        self.levels[col]
    }

    #[inline]
    pub(crate) fn set(&mut self, col: usize, value: f64) {
        self.values[col] = value;
    }

    /// Adds `delta` to an existing entry, lowering its level if needed.
    #[inline]
    pub(crate) fn update(&mut self, col: usize, delta: f64, level: usize) {
        self.values[col] += delta;
        self.levels[col] = self.levels[col].min(level);
    }

    pub(crate) fn insert(&mut self, col: usize, value: f64, level: usize) {
        if self.occupied[col] {
            self.update(col, value, level);
        } else {
            self.occupied[col] = true;
            self.values[col] = value;
            self.levels[col] = level;
            self.columns.push(col);
        }
    }

    pub(crate) fn remove(&mut self, col: usize) {
        self.occupied[col] = false;
        self.values[col] = 0.0;
    }

    /// Occupied columns in arbitrary order.
    pub(crate) fn columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.columns.iter().copied().filter(move |&c| self.occupied[c])
    }

    /// Returns all entries sorted by column and clears the workspace.
    pub(crate) fn drain(&mut self) -> Vec<(usize, f64, usize)> {
        let mut columns = std::mem::take(&mut self.columns);
        columns.sort_unstable();
        let mut entries = Vec::with_capacity(columns.len());
        for col in columns {
            if self.occupied[col] {
                entries.push((col, self.values[col], self.levels[col]));
                self.occupied[col] = false;
                self.values[col] = 0.0;
            }
        }
        entries
    }
}

/// Incomplete LU factorization `A ≈ L U` with unit lower triangular `L`.
///
/// Rows are factored in order by the IKJ variant of Gaussian elimination. The diagonal of `U` is
/// stored inverted, separately from its strictly upper part.
#[derive(Clone, Debug)]
pub struct IncompleteLu {
    lower: CsrMatrix,
    upper: CsrMatrix,
    inv_diag: Vec<f64>,
    rule: FillRule,
}

impl IncompleteLu {
    pub fn new(matrix: &CsrMatrix, rule: FillRule) -> Result<Self, BuildError> {
        if let FillRule::Threshold {
            drop_tolerance,
            fill_factor,
        } = rule
        {
            if !(drop_tolerance >= 0.0) {
                return Err(BuildError::InvalidParameter {
                    name: "drop_tolerance",
                    value: drop_tolerance,
                });
            }
            if !(fill_factor > 0.0) {
                return Err(BuildError::InvalidParameter {
                    name: "fill_factor",
                    value: fill_factor,
                });
            }
        }

        let n = matrix.size();
        let mut work = RowWorkspace::new(n);
        let mut lower_rows = Vec::with_capacity(n);
        let mut upper_rows: Vec<Vec<(usize, f64, usize)>> = Vec::with_capacity(n);
        let mut diag = Vec::with_capacity(n);
        let mut pending = BTreeSet::new();

        for i in 0..n {
            let norm = row_norm(matrix, i);
            let row_len = matrix.row(i).0.len();
            work.load(matrix.row_iter(i));
            pending.extend(work.columns().filter(|&j| j < i));

            while let Some(k) = pending.iter().next().copied() {
                pending.remove(&k);
                let l = work.value(k) / diag[k];
                if rule.drops(l, norm) {
                    work.remove(k);
                    continue;
                }
                work.set(k, l);
                let level_k = work.level(k);
                for &(j, u, level_u) in &upper_rows[k] {
                    let level = level_k + level_u + 1;
                    if work.contains(j) {
                        work.update(j, -l * u, level);
                    } else if rule.admits(level) {
                        work.insert(j, -l * u, level);
                        if j < i {
                            pending.insert(j);
                        }
                    }
                }
            }

            let entries = work.drain();
            let mut d = 0.0;
            let mut lower = Vec::new();
            let mut upper = Vec::new();
            for e in entries {
                match e.0.cmp(&i) {
                    std::cmp::Ordering::Less => lower.push(e),
                    std::cmp::Ordering::Equal => d = e.1,
                    std::cmp::Ordering::Greater => upper.push(e),
                }
            }
            if !(d.abs() > f64::EPSILON * norm) {
                return Err(BuildError::ZeroPivot { row: i, pivot: d });
            }
            rule.select(&mut lower, row_len, norm);
            rule.select(&mut upper, row_len, norm);
            lower_rows.push(lower.into_iter().map(|(j, v, _)| (j, v)).collect());
            upper_rows.push(upper);
            diag.push(d);
        }

        let upper = upper_rows
            .into_iter()
            .map(|row| row.into_iter().map(|(j, v, _)| (j, v)).collect())
            .collect();
        let factor = IncompleteLu {
            lower: CsrMatrix::from_rows(lower_rows),
            upper: CsrMatrix::from_rows(upper),
            inv_diag: diag.into_iter().map(|d| 1.0 / d).collect(),
            rule,
        };
        log::trace!(
            "Incomplete LU with {} + {} off-diagonal entries (matrix nnz {})",
            factor.lower.nnz(),
            factor.upper.nnz(),
            matrix.nnz()
        );
        Ok(factor)
    }
}

impl Preconditioner for IncompleteLu {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        let n = self.inv_diag.len();
        for i in 0..n {
            let s: f64 = self.lower.row_iter(i).map(|(k, l)| l * z[k]).sum();
            z[i] = r[i] - s;
        }
        for i in (0..n).rev() {
            let s: f64 = self.upper.row_iter(i).map(|(j, u)| u * z[j]).sum();
            z[i] = (z[i] - s) * self.inv_diag[i];
        }
    }

    fn name(&self) -> &'static str {
        match self.rule {
            FillRule::Level(0) => "ILU(0)",
            FillRule::Level(_) => "ILU(p)",
            FillRule::Threshold { .. } => "ILUT",
        }
    }
}
