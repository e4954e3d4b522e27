use utils::zip;

#[test]
fn zip_three() {
    let va = vec![1, 2, 3, 4];
    let vb = vec![4, 2, 1, 0];
    let vc = vec![(1, 4), (2, 2), (3, 1), (4, 0)];
    for (a, b, c) in zip!(va.into_iter(), vb.into_iter(), vc.into_iter()) {
        assert_eq!((a, b), c)
    }
}

#[test]
fn zip_four_slices() {
    let a = [1.0, 2.0];
    let b = [3.0, 4.0];
    let c = [5.0, 6.0];
    let mut out = [0.0; 2];
    for (o, &a, &b, &c) in zip!(out.iter_mut(), a.iter(), b.iter(), c.iter()) {
        *o = a + b + c;
    }
    assert_eq!(out, [9.0, 12.0]);
}
