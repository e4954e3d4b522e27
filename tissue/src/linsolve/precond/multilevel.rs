//! Multilevel incomplete LU factorization.
//!
//! Each level runs a threshold ILU over the rows in their natural order. Rows whose pivot would
//! be too small, or whose factors would grow too much, are deferred: they and their columns are
//! moved behind all accepted rows. After the pass the deferred rows are eliminated against the
//! accepted pivots, which leaves an approximate Schur complement on the deferred block. That
//! block is factored the same way on the next level.

use std::collections::BTreeSet;

use super::ilu::{fill_limit, row_norm, select_largest, RowWorkspace};
use super::{BuildError, Preconditioner};
use crate::linalg::CsrMatrix;

/// Scaling applied to the matrix before factorization.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Preprocessing {
    None,
    /// Symmetric scaling `S A S` with `S = |diag(A)|^(-1/2)`.
    DiagonalScaling,
}

/// When rows are moved to the next level.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Deferral {
    /// Single level threshold ILU.
    Never,
    /// Defer rows whose factor entries grow beyond the pivot threshold.
    Growth,
    /// Defer on growth and on pivots below the minimum relative pivot.
    GrowthAndPivot,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MultilevelParams {
    pub preprocessing: Preprocessing,
    pub deferral: Deferral,
    /// Maximum number of levels including the coarsest.
    pub max_levels: usize,
    pub drop_tolerance: f64,
    pub fill_factor: f64,
    /// Bound on `|l_ik|` and `|u_ij / u_ii|` for accepted rows.
    pub pivot_threshold: f64,
    /// Pivots smaller than this fraction of the row norm are deferred.
    pub min_pivot: f64,
}

impl Default for MultilevelParams {
    fn default() -> Self {
        MultilevelParams {
            preprocessing: Preprocessing::None,
            deferral: Deferral::GrowthAndPivot,
            max_levels: 20,
            drop_tolerance: 1e-3,
            fill_factor: 2.0,
            pivot_threshold: 2.75,
            min_pivot: 0.05,
        }
    }
}

/// One level of the factorization.
///
/// Indices are local to the matrix of this level.
#[derive(Clone, Debug)]
struct Level {
    size: usize,
    /// Accepted rows in ascending order.
    kept: Vec<usize>,
    /// Deferred rows in ascending order. These are the rows of the next level.
    deferred: Vec<usize>,
    /// Multipliers of every accepted row.
    lower: Vec<Vec<(usize, f64)>>,
    /// Pivot of every accepted row.
    diag: Vec<f64>,
    /// Remaining entries of every accepted row, over later accepted and all deferred columns.
    upper: Vec<Vec<(usize, f64)>>,
    /// Multipliers of every deferred row.
    lower_deferred: Vec<Vec<(usize, f64)>>,
    coarse: Option<Box<Level>>,
}

/// Outcome of eliminating one row against the accepted pivots.
struct EliminatedRow {
    norm: f64,
    /// Entries in accepted columns, holding multipliers.
    pivotal: Vec<(usize, f64, ())>,
    /// All other entries.
    rest: Vec<(usize, f64, ())>,
}

struct Factorizer<'a> {
    matrix: &'a CsrMatrix,
    params: MultilevelParams,
    work: RowWorkspace,
    pending: BTreeSet<usize>,
    /// Index of the accepted row of every local row.
    pivot_of: Vec<Option<usize>>,
    diag: Vec<f64>,
    upper: Vec<Vec<(usize, f64)>>,
}

impl<'a> Factorizer<'a> {
    fn new(matrix: &'a CsrMatrix, params: MultilevelParams) -> Self {
        let n = matrix.size();
        Factorizer {
            matrix,
            params,
            work: RowWorkspace::new(n),
            pending: BTreeSet::new(),
            pivot_of: vec![None; n],
            diag: Vec::new(),
            upper: Vec::new(),
        }
    }

    /// Eliminates the accepted pivot columns from row `i`.
    ///
    /// During the first pass only pivots before `limit` exist, so `limit` bounds which fill
    /// columns are scheduled for elimination.
    fn eliminate(&mut self, i: usize, limit: usize) -> EliminatedRow {
        let norm = row_norm(self.matrix, i);
        let drop = self.params.drop_tolerance * norm;
        self.work.load(self.matrix.row_iter(i));
        let pivot_of = &self.pivot_of;
        self.pending.extend(
            self.work
                .columns()
                .filter(|&j| j < limit && pivot_of[j].is_some()),
        );

        while let Some(k) = self.pending.iter().next().copied() {
            self.pending.remove(&k);
            let p = match self.pivot_of[k] {
                Some(p) => p,
                None => continue,
            };
            let l = self.work.value(k) / self.diag[p];
            if l.abs() < drop {
                self.work.remove(k);
                continue;
            }
            self.work.set(k, l);
            for &(j, u) in &self.upper[p] {
                let scheduled = !self.work.contains(j) && j < limit && self.pivot_of[j].is_some();
                self.work.insert(j, -l * u, 0);
                if scheduled {
                    self.pending.insert(j);
                }
            }
        }

        let mut pivotal = Vec::new();
        let mut rest = Vec::new();
        for (j, v, _) in self.work.drain() {
            if j < limit && self.pivot_of[j].is_some() {
                pivotal.push((j, v, ()));
            } else {
                rest.push((j, v, ()));
            }
        }
        EliminatedRow {
            norm,
            pivotal,
            rest,
        }
    }

    fn defer(&self, pivot: f64, row: &EliminatedRow) -> bool {
        let MultilevelParams {
            deferral,
            pivot_threshold,
            min_pivot,
            ..
        } = self.params;
        if deferral == Deferral::Never {
            return false;
        }
        let l_growth = row.pivotal.iter().fold(0.0_f64, |m, e| m.max(e.1.abs()));
        let u_growth = row.rest.iter().fold(0.0_f64, |m, e| m.max(e.1.abs())) / pivot.abs();
        let grows = !(l_growth.max(u_growth) <= pivot_threshold);
        let small = pivot.abs() < min_pivot * row.norm;
        match deferral {
            Deferral::Never => false,
            Deferral::Growth => grows,
            Deferral::GrowthAndPivot => grows || small,
        }
    }

    fn build(mut self, depth: usize) -> Result<Level, BuildError> {
        let n = self.matrix.size();
        let may_defer = depth + 1 < self.params.max_levels;
        let fill_factor = self.params.fill_factor;

        let mut kept = Vec::new();
        let mut deferred = Vec::new();
        let mut lower = Vec::new();

        for i in 0..n {
            let mut row = self.eliminate(i, i);
            let row_len = self.matrix.row(i).0.len();
            let limit = fill_limit(fill_factor, row_len);
            let drop = self.params.drop_tolerance * row.norm;
            let pivot = row
                .rest
                .iter()
                .position(|e| e.0 == i)
                .map(|pos| row.rest.remove(pos).1)
                .unwrap_or(0.0);
            select_largest(&mut row.pivotal, drop, limit);
            select_largest(&mut row.rest, drop, limit);

            if may_defer && self.defer(pivot, &row) {
                deferred.push(i);
                continue;
            }
            if !(pivot.abs() > f64::EPSILON * row.norm) {
                return Err(BuildError::ZeroPivot { row: i, pivot });
            }
            self.pivot_of[i] = Some(kept.len());
            kept.push(i);
            lower.push(row.pivotal.into_iter().map(|(j, v, _)| (j, v)).collect());
            self.diag.push(pivot);
            self.upper
                .push(row.rest.into_iter().map(|(j, v, _)| (j, v)).collect());
        }

        if kept.is_empty() {
            // Every row was deferred; this level cannot make progress.
            let mut params = self.params;
            params.deferral = Deferral::Never;
            return Factorizer::new(self.matrix, params).build(depth);
        }

        let mut block_index = vec![usize::MAX; n];
        for (q, &i) in deferred.iter().enumerate() {
            block_index[i] = q;
        }
        let mut lower_deferred = Vec::with_capacity(deferred.len());
        let mut schur_rows = Vec::with_capacity(deferred.len());
        for &i in &deferred {
            let mut row = self.eliminate(i, n);
            let limit = fill_limit(fill_factor, self.matrix.row(i).0.len());
            let drop = self.params.drop_tolerance * row.norm;
            select_largest(&mut row.pivotal, drop, limit);
            let diagonal = row.rest.iter().position(|e| e.0 == i).map(|pos| row.rest.remove(pos));
            select_largest(&mut row.rest, drop, limit);
            if let Some(d) = diagonal {
                let pos = row.rest.partition_point(|e| e.0 < i);
                row.rest.insert(pos, d);
            }
            lower_deferred.push(row.pivotal.into_iter().map(|(j, v, _)| (j, v)).collect());
            schur_rows.push(
                row.rest
                    .into_iter()
                    .map(|(j, v, _)| (block_index[j], v))
                    .collect(),
            );
        }

        let coarse = if deferred.is_empty() {
            None
        } else {
            let schur = CsrMatrix::from_rows(schur_rows);
            log::trace!(
                "Multilevel ILU level {}: {} rows kept, {} deferred",
                depth,
                kept.len(),
                deferred.len()
            );
            Some(Box::new(Factorizer::new(&schur, self.params).build(depth + 1)?))
        };

        Ok(Level {
            size: n,
            kept,
            deferred,
            lower,
            diag: self.diag,
            upper: self.upper,
            lower_deferred,
            coarse,
        })
    }
}

impl Level {
    fn num_levels(&self) -> usize {
        1 + self.coarse.as_ref().map_or(0, |c| c.num_levels())
    }

    fn apply(&self, r: &[f64], z: &mut [f64]) {
        debug_assert_eq!(r.len(), self.size);
        // Forward substitution over the accepted rows.
        for (p, &i) in self.kept.iter().enumerate() {
            let s: f64 = self.lower[p].iter().map(|&(k, l)| l * z[k]).sum();
            z[i] = r[i] - s;
        }

        // Coarse correction on the deferred block.
        if let Some(coarse) = &self.coarse {
            let rd: Vec<f64> = self
                .deferred
                .iter()
                .zip(self.lower_deferred.iter())
                .map(|(&i, lower)| r[i] - lower.iter().map(|&(k, l)| l * z[k]).sum::<f64>())
                .collect();
            let mut zd = vec![0.0; rd.len()];
            coarse.apply(&rd, &mut zd);
            for (&i, &v) in self.deferred.iter().zip(zd.iter()) {
                z[i] = v;
            }
        }

        // Backward substitution over the accepted rows.
        for (p, &i) in self.kept.iter().enumerate().rev() {
            let s: f64 = self.upper[p].iter().map(|&(j, u)| u * z[j]).sum();
            z[i] = (z[i] - s) / self.diag[p];
        }
    }
}

/// Multilevel ILU preconditioner.
#[derive(Clone, Debug)]
pub struct MultilevelIlu {
    scaling: Option<Vec<f64>>,
    root: Level,
}

impl MultilevelIlu {
    pub fn new(matrix: &CsrMatrix, params: MultilevelParams) -> Result<Self, BuildError> {
        for (name, value) in [
            ("drop_tolerance", params.drop_tolerance),
            ("pivot_threshold", params.pivot_threshold),
            ("min_pivot", params.min_pivot),
        ] {
            if !(value >= 0.0) {
                return Err(BuildError::InvalidParameter { name, value });
            }
        }
        if !(params.fill_factor > 0.0) {
            return Err(BuildError::InvalidParameter {
                name: "fill_factor",
                value: params.fill_factor,
            });
        }

        let (scaling, root) = match params.preprocessing {
            Preprocessing::None => (None, Factorizer::new(matrix, params).build(0)?),
            Preprocessing::DiagonalScaling => {
                let s: Vec<f64> = matrix
                    .diagonal()
                    .into_iter()
                    .map(|d| if d == 0.0 { 1.0 } else { 1.0 / d.abs().sqrt() })
                    .collect();
                let rows = (0..matrix.size())
                    .map(|i| matrix.row_iter(i).map(|(j, v)| (j, s[i] * v * s[j])).collect())
                    .collect();
                let scaled = CsrMatrix::from_rows(rows);
                let root = Factorizer::new(&scaled, params).build(0)?;
                (Some(s), root)
            }
        };
        log::debug!("Multilevel ILU with {} levels", root.num_levels());
        Ok(MultilevelIlu { scaling, root })
    }

    pub fn num_levels(&self) -> usize {
        self.root.num_levels()
    }
}

impl Preconditioner for MultilevelIlu {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        match &self.scaling {
            None => self.root.apply(r, z),
            Some(s) => {
                let scaled: Vec<f64> = r.iter().zip(s.iter()).map(|(r, s)| r * s).collect();
                self.root.apply(&scaled, z);
                for (z, s) in z.iter_mut().zip(s.iter()) {
                    *z *= s;
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "multilevel ILU"
    }
}
