//! Remez exchange for odd minimax approximations of `sign(x)`.
//!
//! The target is `sign` on `[-1, -a] ∪ [a, 1]`. By symmetry this reduces to
//! the best odd polynomial approximation of the constant `1` on `[a, 1]`,
//! expanded in the odd Chebyshev polynomials `T_1, T_3, …, T_d`.
use super::linalg::solve;
use std::f64::consts::PI;

const MAX_ITERATIONS: usize = 64;
const CONVERGENCE: f64 = 1e-6;
/// Grid used to bracket the extrema of a finished approximation.
const RANGE_GRID: usize = 8192;
const GOLDEN_ITERATIONS: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct OddMinimax {
    /// Chebyshev coefficients `c_0..c_d`, even entries are zero.
    pub coeffs: Vec<f64>,
    /// `max |p(x) - 1|` over `[a, 1]`.
    pub max_error: f64,
}

impl OddMinimax {
    pub fn evaluate(&self, x: f64) -> f64 {
        odd_series(&self.coeffs, x)
    }

    /// `(min p, max |p|)`: the minimum over `[a, 1]` and the peak over
    /// `[-1, 1]`, each refined past the resolution of the exchange grid.
    pub fn range(&self, a: f64) -> (f64, f64) {
        let peak = refined_maximum(|x| self.evaluate(x).abs(), 0.0, 1.0);
        let low = -refined_maximum(|x| -self.evaluate(x), a, 1.0);
        (low, peak)
    }
}

/// Maximum of `f` on `[lo, hi]`. Every local maximum of a uniform grid is
/// refined by golden-section search inside its neighbouring cells.
fn refined_maximum(f: impl Fn(f64) -> f64, lo: f64, hi: f64) -> f64 {
    let n = RANGE_GRID;
    let step = (hi - lo) / n as f64;
    let at = |i: usize| lo + step * i as f64;
    let values: Vec<f64> = (0..=n).map(|i| f(at(i))).collect();

    let mut best = f64::NEG_INFINITY;
    for i in 0..=n {
        let left = i == 0 || values[i] >= values[i - 1];
        let right = i == n || values[i] >= values[i + 1];
        if left && right {
            let a = at(i.saturating_sub(1));
            let b = if i == n { hi } else { at(i + 1) };
            best = best.max(values[i]).max(golden_section(&f, a, b));
        }
    }
    best
}

fn golden_section(f: &impl Fn(f64) -> f64, mut a: f64, mut b: f64) -> f64 {
    let r = 0.5 * (5f64.sqrt() - 1.0);
    let mut c = b - r * (b - a);
    let mut d = a + r * (b - a);
    let (mut fc, mut fd) = (f(c), f(d));
    for _ in 0..GOLDEN_ITERATIONS {
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - r * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + r * (b - a);
            fd = f(d);
        }
    }
    fc.max(fd)
}

fn odd_series(coeffs: &[f64], x: f64) -> f64 {
    let theta = x.clamp(-1.0, 1.0).acos();
    coeffs
        .iter()
        .enumerate()
        .skip(1)
        .step_by(2)
        .map(|(m, c)| c * (m as f64 * theta).cos())
        .sum()
}

/// Best odd approximation of degree `degree` (odd) to `1` on `[a, 1]`.
///
/// Returns `None` when `a` is not in `(0, 1)`, the degree is even, or the
/// exchange system becomes singular.
pub fn odd_sign_minimax(a: f64, degree: usize) -> Option<OddMinimax> {
    if !(a > 0.0 && a < 1.0) || degree % 2 == 0 {
        return None;
    }
    let k = degree.div_ceil(2);
    let grid_size = (64 * (k + 1)).max(2048);
    let grid: Vec<f64> = (0..grid_size)
        .map(|i| a + (1.0 - a) * i as f64 / (grid_size - 1) as f64)
        .collect();

    let (mid, half) = (0.5 * (1.0 + a), 0.5 * (1.0 - a));
    let mut reference: Vec<f64> = (0..=k)
        .map(|i| mid - half * (PI * i as f64 / k as f64).cos())
        .collect();

    let mut coeffs = vec![0.0; degree + 1];
    let mut max_error = f64::INFINITY;

    for _ in 0..MAX_ITERATIONS {
        let matrix: Vec<Vec<f64>> = reference
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let theta = x.acos();
                let mut row: Vec<f64> = (0..k)
                    .map(|j| ((2 * j + 1) as f64 * theta).cos())
                    .collect();
                row.push(if i % 2 == 0 { 1.0 } else { -1.0 });
                row
            })
            .collect();
        let solution = solve(matrix, vec![1.0; k + 1])?;
        let levelled = solution[k].abs();
        for j in 0..k {
            coeffs[2 * j + 1] = solution[j];
        }

        let errors: Vec<f64> = grid.iter().map(|&x| odd_series(&coeffs, x) - 1.0).collect();
        max_error = errors.iter().fold(0.0f64, |m, e| m.max(e.abs()));

        let extrema = alternating_extrema(&errors, k + 1);
        if extrema.len() < k + 1 {
            break;
        }
        reference = extrema.iter().map(|&i| grid[i]).collect();

        if max_error - levelled <= CONVERGENCE * max_error {
            break;
        }
    }

    Some(OddMinimax { coeffs, max_error })
}

/// Picks `count` grid indices where the error alternates in sign, keeping the
/// largest magnitude within each run of equal sign.
fn alternating_extrema(errors: &[f64], count: usize) -> Vec<usize> {
    let n = errors.len();
    let mut candidates = Vec::new();
    for i in 0..n {
        let is_extremum = if i == 0 || i == n - 1 {
            true
        } else {
            (errors[i] - errors[i - 1]) * (errors[i + 1] - errors[i]) <= 0.0
        };
        if is_extremum && errors[i] != 0.0 {
            candidates.push(i);
        }
    }

    let mut alternating: Vec<usize> = Vec::with_capacity(candidates.len());
    for i in candidates {
        let same_sign = alternating
            .last()
            .is_some_and(|&last| errors[last].signum() == errors[i].signum());
        if same_sign {
            let last = alternating.len() - 1;
            if errors[i].abs() > errors[alternating[last]].abs() {
                alternating[last] = i;
            }
        } else {
            alternating.push(i);
        }
    }

    while alternating.len() > count {
        let first = errors[alternating[0]].abs();
        let last = errors[alternating[alternating.len() - 1]].abs();
        if first < last {
            alternating.remove(0);
        } else {
            alternating.pop();
        }
    }
    alternating
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cubic_minimax_equioscillates() {
        let approx = odd_sign_minimax(0.25, 3).unwrap();
        assert!(approx.max_error < 0.5, "error {}", approx.max_error);
        let at_a = approx.evaluate(0.25) - 1.0;
        let at_one = approx.evaluate(1.0) - 1.0;
        assert!((at_a.abs() - approx.max_error).abs() < 1e-3);
        assert!((at_one.abs() - approx.max_error).abs() < 1e-3);
        // three alternation points: both endpoints share a sign
        assert!(at_a * at_one > 0.0);
    }

    #[test]
    fn higher_degree_reduces_error() {
        let e7 = odd_sign_minimax(0.1, 7).unwrap().max_error;
        let e15 = odd_sign_minimax(0.1, 15).unwrap().max_error;
        assert!(e15 < e7);
        assert!(odd_sign_minimax(0.1, 15).unwrap().evaluate(-0.5) < 0.0);
    }

    #[test]
    fn range_bounds_a_finer_sampling() {
        let a = 2f64.powi(-8);
        let approx = odd_sign_minimax(a, 15).unwrap();
        let (low, peak) = approx.range(a);
        assert!(low > 0.0 && peak > 1.0);
        for i in 0..=100_000 {
            let x = i as f64 / 100_000.0;
            let y = approx.evaluate(x);
            assert!(y.abs() <= peak + 1e-12, "x = {x}");
            if x >= a {
                assert!(y >= low - 1e-12, "x = {x}");
            }
        }
    }

    #[test]
    fn rejects_even_degree_and_bad_interval() {
        assert!(odd_sign_minimax(0.1, 4).is_none());
        assert!(odd_sign_minimax(0.0, 5).is_none());
        assert!(odd_sign_minimax(1.0, 5).is_none());
    }
}
