//! Seeded random data used to exercise linear solvers and kernels.

use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generate a vector of `n` values uniformly distributed in `[-1, 1)`.
pub fn random_vector(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let range = Uniform::new(-1.0, 1.0);
    (0..n).map(|_| rng.sample(range)).collect()
}

/// Generate a vector of `n` triplets uniformly distributed in `[-1, 1)^3`.
pub fn random_vectors(n: usize, seed: u64) -> Vec<[f64; 3]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let range = Uniform::new(-1.0, 1.0);
    (0..n)
        .map(|_| [rng.sample(range), rng.sample(range), rng.sample(range)])
        .collect()
}

/// Generate the `(row, col, value)` triplets of a random sparse symmetric positive definite
/// matrix of size `n`.
///
/// Each row receives up to `offdiag_per_row` symmetric off-diagonal couplings. The diagonal is
/// set to the absolute row sum plus `shift`, which makes the matrix strictly diagonally
/// dominant. Smaller shifts produce worse conditioned matrices.
///
/// Duplicate positions may appear in the output and are expected to be summed.
pub fn random_spd_triplets(
    n: usize,
    offdiag_per_row: usize,
    shift: f64,
    seed: u64,
) -> Vec<(usize, usize, f64)> {
    assert!(shift > 0.0, "shift must be positive to guarantee definiteness");
    let mut rng = StdRng::seed_from_u64(seed);
    let value = Uniform::new(-1.0, 1.0);
    let mut triplets = Vec::with_capacity(n * (2 * offdiag_per_row + 1));
    let mut row_sums = vec![0.0; n];

    if n > 1 {
        let col = Uniform::new(0, n);
        for row in 0..n {
            for _ in 0..offdiag_per_row {
                let c = rng.sample(col);
                if c == row {
                    continue;
                }
                let v: f64 = rng.sample(value);
                triplets.push((row, c, v));
                triplets.push((c, row, v));
                row_sums[row] += v.abs();
                row_sums[c] += v.abs();
            }
        }
    }

    for (i, sum) in row_sums.into_iter().enumerate() {
        triplets.push((i, i, sum + shift));
    }
    triplets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_vectors_repeat() {
        assert_eq!(random_vector(10, 7), random_vector(10, 7));
        assert_ne!(random_vector(10, 7), random_vector(10, 8));
        assert_eq!(random_vectors(4, 3).len(), 4);
    }

    #[test]
    fn spd_triplets_are_symmetric_and_dominant() {
        let n = 20;
        let triplets = random_spd_triplets(n, 3, 0.5, 42);
        let mut dense = vec![vec![0.0; n]; n];
        for &(r, c, v) in &triplets {
            dense[r][c] += v;
        }
        for i in 0..n {
            let off: f64 = (0..n).filter(|&j| j != i).map(|j| dense[i][j].abs()).sum();
            assert!(dense[i][i] > off);
            for j in 0..n {
                approx::assert_relative_eq!(dense[i][j], dense[j][i]);
            }
        }
    }
}
