/// Zip up to four iterators into an iterator of flat tuples.
///
/// ```
/// use utils::zip;
/// let sums: Vec<_> = zip!(vec![1, 2], vec![3, 4], vec![5, 6])
///     .map(|(a, b, c)| a + b + c)
///     .collect();
/// assert_eq!(sums, vec![9, 12]);
/// ```
#[macro_export]
macro_rules! zip {
    ($a:expr $(,)?) => {
        ::std::iter::IntoIterator::into_iter($a)
    };
    ($a:expr, $b:expr $(,)?) => {
        ::std::iter::IntoIterator::into_iter($a).zip($b)
    };
    ($a:expr, $b:expr, $c:expr $(,)?) => {
        ::std::iter::IntoIterator::into_iter($a)
            .zip($b)
            .zip($c)
            .map(|((a, b), c)| (a, b, c))
    };
    ($a:expr, $b:expr, $c:expr, $d:expr $(,)?) => {
        ::std::iter::IntoIterator::into_iter($a)
            .zip($b)
            .zip($c)
            .zip($d)
            .map(|(((a, b), c), d)| (a, b, c, d))
    };
}
