//! Small dense solvers for the approximation routines.

/// Solves the square system `a · x = b` by Gaussian elimination with partial
/// pivoting. Returns `None` when the matrix is numerically singular.
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    debug_assert!(a.len() == n && a.iter().all(|row| row.len() == n));

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < f64::MIN_POSITIVE {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// Least-squares solution of the overdetermined system `a · x ≈ b`
/// (`rows >= cols`) through Householder QR.
pub fn least_squares(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let rows = b.len();
    let cols = a.first().map_or(0, Vec::len);
    if rows < cols {
        return None;
    }

    for col in 0..cols {
        let norm = (col..rows).map(|i| a[i][col] * a[i][col]).sum::<f64>().sqrt();
        if norm < f64::MIN_POSITIVE {
            return None;
        }
        let alpha = if a[col][col] > 0.0 { -norm } else { norm };

        let mut v: Vec<f64> = (col..rows).map(|i| a[i][col]).collect();
        v[0] -= alpha;
        let v_norm2: f64 = v.iter().map(|x| x * x).sum();
        if v_norm2 < f64::MIN_POSITIVE {
            continue;
        }

        for k in col..cols {
            let dot: f64 = v.iter().enumerate().map(|(i, vi)| vi * a[col + i][k]).sum();
            let factor = 2.0 * dot / v_norm2;
            for (i, vi) in v.iter().enumerate() {
                a[col + i][k] -= factor * vi;
            }
        }
        let dot: f64 = v.iter().enumerate().map(|(i, vi)| vi * b[col + i]).sum();
        let factor = 2.0 * dot / v_norm2;
        for (i, vi) in v.iter().enumerate() {
            b[col + i] -= factor * vi;
        }
    }

    let mut x = vec![0.0; cols];
    for row in (0..cols).rev() {
        let tail: f64 = (row + 1..cols).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn solve_recovers_known_solution() {
        let a = vec![
            vec![0.0, 2.0, 1.0],
            vec![1.0, -1.0, 0.0],
            vec![3.0, 0.0, 1.0],
        ];
        let x = solve(a, vec![5.0, -1.0, 4.0]).unwrap();
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn solve_rejects_singular_matrix() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(solve(a, vec![1.0, 2.0]).is_none());
    }

    #[test]
    fn least_squares_fits_a_line() {
        // y = 2x + 1 sampled exactly
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let a: Vec<Vec<f64>> = xs.iter().map(|&x| vec![1.0, x]).collect();
        let b: Vec<f64> = xs.iter().map(|&x| 2.0 * x + 1.0).collect();
        let coeffs = least_squares(a, b).unwrap();
        assert_abs_diff_eq!(coeffs[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(coeffs[1], 2.0, epsilon = 1e-12);
    }
}
