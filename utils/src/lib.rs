/**
 * This crate provides various convenience functions and utilities shared by the simulation crate,
 * its tests and its benchmarks.
 */
pub mod random;
pub mod zip;

pub use crate::random::*;

/// Returns the largest absolute value in the given sequence, or zero if the sequence is empty.
pub fn inf_norm<I>(iter: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    iter.into_iter().map(f64::abs).fold(0.0, f64::max)
}

/// Relative difference between two values scaled by the larger of the two magnitudes.
///
/// Returns zero when both values are zero.
pub fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    } else {
        (a - b).abs() / scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inf_norm_test() {
        assert_eq!(inf_norm(vec![1.0, -3.5, 2.0]), 3.5);
        assert_eq!(inf_norm(Vec::new()), 0.0);
    }

    #[test]
    fn relative_difference_test() {
        assert_eq!(relative_difference(0.0, 0.0), 0.0);
        assert_eq!(relative_difference(2.0, 1.0), 0.5);
        assert_eq!(relative_difference(-1.0, 1.0), 2.0);
    }
}
