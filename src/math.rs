use itertools::izip;
use multiversion::multiversion;

#[multiversion(targets("x86_64+avx+avx2", "x86+sse"))]
pub(crate) fn vector_dot(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len();
    assert!(a.len() == b.len());

    let head_length = n - n % 4;

    let (x, x_tail) = a.split_at(head_length);
    let (y, y_tail) = b.split_at(head_length);

    let sum = izip!(x.chunks_exact(4), y.chunks_exact(4)).fold([0f64; 4], |mut acc, (x, y)| {
        acc[0] += x[0] * y[0];
        acc[1] += x[1] * y[1];
        acc[2] += x[2] * y[2];
        acc[3] += x[3] * y[3];
        acc
    });

    let mut result = (sum[0] + sum[1]) + (sum[2] + sum[3]);
    for (val1, val2) in x_tail.iter().zip(y_tail) {
        result += *val1 * *val2;
    }
    result
}

#[multiversion(targets("x86_64+avx+avx2", "x86+sse"))]
pub(crate) fn axpy(x: &[f64], y: &mut [f64], a: f64) {
    let n = x.len();
    assert!(y.len() == n);

    /*
    for i in 0..n {
        y[i] += a * x[i];
    }
    */

    let head_length = n - n % 4;

    let (x, x_tail) = x.split_at(head_length);
    let (y, y_tail) = y.split_at_mut(head_length);

    izip!(x.chunks_exact(4), y.chunks_exact_mut(4)).for_each(|(x, y)| {
        y[0] += a * x[0];
        y[1] += a * x[1];
        y[2] += a * x[2];
        y[3] += a * x[3];
    });

    izip!(x_tail, y_tail).for_each(|(x, y)| {
        *y += a * x;
    });
}

#[inline]
pub(crate) fn norm(x: &[f64]) -> f64 {
    vector_dot(x, x).sqrt()
}

pub(crate) fn mean(x: &[f64]) -> f64 {
    x.iter().sum::<f64>() / x.len() as f64
}

/// Sum of squared deviations from the mean.
pub(crate) fn centered_sum_squares(x: &[f64]) -> f64 {
    let m = mean(x);
    x.iter().map(|v| (v - m) * (v - m)).sum()
}

/// Exact binomial coefficient, `None` on overflow.
pub(crate) fn binomial(n: usize, k: usize) -> Option<usize> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    let mut out = 1usize;
    for i in 1..=k {
        // out * (n - k + i) is always divisible by i at this point
        out = out.checked_mul(n - k + i)? / i;
    }
    Some(out)
}
