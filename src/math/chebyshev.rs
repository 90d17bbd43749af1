//! Chebyshev interpolation.
//!
//! The interpolant of `f` on `[a, b]` through the `n` Chebyshev nodes of the
//! first kind has coefficients given by a DCT-II of the samples. The DCT is
//! computed with a complex FFT of the mirrored sample vector (length `2n`).
use num_complex::Complex64;
use rustfft::FftPlanner;
use std::f64::consts::PI;

/// Chebyshev nodes of the first kind mapped to `[a, b]`, in DCT order.
pub fn chebyshev_nodes(n: usize, a: f64, b: f64) -> Vec<f64> {
    (0..n)
        .map(|k| {
            let x = (PI * (k as f64 + 0.5) / n as f64).cos();
            0.5 * (b - a) * x + 0.5 * (a + b)
        })
        .collect()
}

/// Coefficients `c_0..c_{n-1}` of `Σ c_j T_j((2x - a - b) / (b - a))`
/// interpolating `f` at `n` Chebyshev nodes of `[a, b]`.
///
/// `c_0` is already halved, so the series is evaluated without special-casing
/// the constant term.
pub fn chebyshev_approximation<F>(f: F, n: usize, a: f64, b: f64) -> Vec<f64>
where
    F: Fn(f64) -> f64,
{
    assert!(n > 0, "chebyshev_approximation: node count must be positive");
    assert!(a < b, "chebyshev_approximation: empty interval [{a}, {b}]");

    let samples: Vec<f64> = chebyshev_nodes(n, a, b).into_iter().map(f).collect();

    let mut buffer = vec![Complex64::new(0.0, 0.0); 2 * n];
    for (k, &y) in samples.iter().enumerate() {
        buffer[k] = Complex64::new(y, 0.0);
        buffer[2 * n - 1 - k] = Complex64::new(y, 0.0);
    }

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(2 * n).process(&mut buffer);

    let mut coeffs: Vec<f64> = (0..n)
        .map(|j| {
            let twiddle = Complex64::from_polar(1.0, -PI * j as f64 / (2 * n) as f64);
            (twiddle * buffer[j]).re / n as f64
        })
        .collect();
    coeffs[0] *= 0.5;
    coeffs
}

/// Clenshaw evaluation of `Σ c_j T_j(x)` for `x` already mapped to `[-1, 1]`.
pub fn clenshaw<T>(coeffs: &[T], x: T) -> T
where
    T: Copy
        + std::ops::Add<Output = T>
        + std::ops::Sub<Output = T>
        + std::ops::Mul<Output = T>
        + std::ops::Mul<f64, Output = T>
        + Default,
{
    let mut b1 = T::default();
    let mut b2 = T::default();
    for &c in coeffs.iter().skip(1).rev() {
        let b0 = c + x * b1 * 2.0_f64 - b2;
        b2 = b1;
        b1 = b0;
    }
    match coeffs.first() {
        Some(&c0) => c0 + x * b1 - b2,
        None => T::default(),
    }
}
