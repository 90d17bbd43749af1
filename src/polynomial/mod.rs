//! Plaintext polynomials in the monomial or Chebyshev basis.
//!
//! These are the inputs of the homomorphic polynomial evaluator. They are
//! constructed once (often at setup time) and never mutated by evaluation.
mod vector;

pub use vector::PolynomialVector;

use crate::errors::{EvalError, EvalResult};
use crate::math::{chebyshev_approximation, clenshaw};
use num_complex::Complex64;

/// Coefficients below this magnitude are treated as zero when deciding
/// parity and when skipping terms during evaluation.
pub const NEGLIGIBLE: f64 = 1e-14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basis {
    Monomial,
    Chebyshev,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    pub basis: Basis,
    pub coeffs: Vec<Complex64>,
    /// Interval `[a, b]` a Chebyshev series is defined on. `[-1, 1]` for monomials.
    pub interval: [f64; 2],
    /// Only odd-degree coefficients are non-zero.
    pub is_odd: bool,
    /// Only even-degree coefficients are non-zero.
    pub is_even: bool,
    /// Defer relinearization of the intermediate powers.
    pub lazy: bool,
}

pub(crate) fn is_negligible(c: Complex64) -> bool {
    c.re.abs() < NEGLIGIBLE && c.im.abs() < NEGLIGIBLE
}

impl Polynomial {
    pub fn new(basis: Basis, coeffs: Vec<Complex64>, interval: [f64; 2]) -> EvalResult<Self> {
        if coeffs.is_empty() {
            return Err(EvalError::invalid("polynomial has no coefficients"));
        }
        if !(interval[0] < interval[1]) {
            return Err(EvalError::invalid(format!(
                "empty polynomial interval [{}, {}]",
                interval[0], interval[1]
            )));
        }
        let (mut is_odd, mut is_even) = (true, true);
        for (i, &c) in coeffs.iter().enumerate() {
            if !is_negligible(c) {
                if i & 1 == 0 {
                    is_odd = false;
                } else {
                    is_even = false;
                }
            }
        }
        Ok(Self {
            basis,
            coeffs,
            interval,
            is_odd,
            is_even,
            lazy: false,
        })
    }

    pub fn monomial(coeffs: &[f64]) -> EvalResult<Self> {
        Self::new(Basis::Monomial, to_complex(coeffs), [-1.0, 1.0])
    }

    pub fn chebyshev(coeffs: &[f64], interval: [f64; 2]) -> EvalResult<Self> {
        Self::new(Basis::Chebyshev, to_complex(coeffs), interval)
    }

    /// Chebyshev interpolant of `f` of the given degree on `interval`.
    pub fn approximate<F>(f: F, interval: [f64; 2], degree: usize) -> EvalResult<Self>
    where
        F: Fn(f64) -> f64,
    {
        if !(interval[0] < interval[1]) {
            return Err(EvalError::invalid("empty approximation interval"));
        }
        let coeffs = chebyshev_approximation(f, degree + 1, interval[0], interval[1]);
        Self::chebyshev(&coeffs, interval)
    }

    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    /// Multiplicative depth `ceil(log2(degree + 1))`.
    pub fn depth(&self) -> usize {
        bit_length(self.degree())
    }

    /// `(scalar, constant)` such that `scalar * x + constant` maps the
    /// interval onto `[-1, 1]`. Identity for monomials.
    pub fn change_of_basis(&self) -> (f64, f64) {
        match self.basis {
            Basis::Monomial => (1.0, 0.0),
            Basis::Chebyshev => {
                let [a, b] = self.interval;
                (2.0 / (b - a), (-a - b) / (b - a))
            }
        }
    }

    /// Plaintext evaluation, used as the reference for encrypted evaluation.
    pub fn evaluate(&self, x: Complex64) -> Complex64 {
        match self.basis {
            Basis::Monomial => self
                .coeffs
                .iter()
                .rev()
                .fold(Complex64::new(0.0, 0.0), |acc, &c| acc * x + c),
            Basis::Chebyshev => {
                let (scalar, constant) = self.change_of_basis();
                clenshaw(&self.coeffs, x * scalar + constant)
            }
        }
    }

    pub fn evaluate_real(&self, x: f64) -> f64 {
        self.evaluate(Complex64::new(x, 0.0)).re
    }

    /// Splits `p = q · X^n + r` (monomial) or `p = q · T_n + r` (Chebyshev)
    /// with `deg(r) < n`. Parity and laziness are inherited by both parts.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero or larger than the degree.
    pub fn factorize(&self, n: usize) -> (Polynomial, Polynomial) {
        assert!(
            n > 0 && n <= self.degree(),
            "factorize: split point {n} outside [1, {}]",
            self.degree()
        );
        let degree = self.degree();
        let mut remainder: Vec<Complex64> = self.coeffs[..n].to_vec();
        let mut quotient: Vec<Complex64> = self.coeffs[n..].to_vec();

        if self.basis == Basis::Chebyshev {
            // T_{n+j} = 2 T_n T_j - T_{n-j}
            for i in n + 1..=degree {
                quotient[i - n] = self.coeffs[i] * 2.0;
                remainder[2 * n - i] -= self.coeffs[i];
            }
        }

        let part = |coeffs: Vec<Complex64>| Polynomial {
            basis: self.basis,
            coeffs,
            interval: self.interval,
            is_odd: self.is_odd,
            is_even: self.is_even,
            lazy: self.lazy,
        };
        (part(quotient), part(remainder))
    }

    /// Returns `scalar · p + constant`. With `(0.5, 0.5)` this turns a sign
    /// approximation into a step function.
    pub fn affine(&self, scalar: f64, constant: f64) -> Polynomial {
        let mut coeffs: Vec<Complex64> = self.coeffs.iter().map(|c| c * scalar).collect();
        coeffs[0] += constant;
        // the constant term can break odd parity, so flags are recomputed
        Polynomial::new(self.basis, coeffs, self.interval)
            .map(|p| p.with_lazy(self.lazy))
            .unwrap_or_else(|_| self.clone())
    }
}

fn to_complex(coeffs: &[f64]) -> Vec<Complex64> {
    coeffs.iter().map(|&c| Complex64::new(c, 0.0)).collect()
}

/// Number of bits needed to represent `x`, i.e. `ceil(log2(x + 1))`.
pub(crate) fn bit_length(x: usize) -> usize {
    (usize::BITS - x.leading_zeros()) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn parity_is_detected() {
        let odd = Polynomial::monomial(&[0.0, 1.0, 0.0, -0.5]).unwrap();
        assert!(odd.is_odd && !odd.is_even);
        let even = Polynomial::monomial(&[1.0, 0.0, 2.0]).unwrap();
        assert!(even.is_even && !even.is_odd);
        let dense = Polynomial::monomial(&[1.0, 1.0]).unwrap();
        assert!(!dense.is_even && !dense.is_odd);
    }

    #[test]
    fn depth_is_ceil_log2_of_degree_plus_one() {
        let p = |d: usize| Polynomial::monomial(&vec![1.0; d + 1]).unwrap().depth();
        assert_eq!(p(1), 1);
        assert_eq!(p(3), 2);
        assert_eq!(p(4), 3);
        assert_eq!(p(7), 3);
        assert_eq!(p(8), 4);
    }

    #[test]
    fn monomial_factorization_recombines() {
        let p = Polynomial::monomial(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let (q, r) = p.factorize(4);
        assert_eq!(q.degree(), 1);
        assert_eq!(r.degree(), 3);
        let x = Complex64::new(0.3, 0.0);
        let recombined = q.evaluate(x) * x.powi(4) + r.evaluate(x);
        assert_abs_diff_eq!(recombined.re, p.evaluate(x).re, epsilon = 1e-12);
    }

    #[test]
    fn chebyshev_factorization_recombines() {
        let p = Polynomial::chebyshev(&[0.5, -1.0, 0.25, 2.0, -0.75, 0.1, 0.3], [-1.0, 1.0])
            .unwrap();
        let (q, r) = p.factorize(4);
        for &x in &[-0.9, -0.2, 0.4, 0.77] {
            let t4 = 8.0 * x * x * x * x - 8.0 * x * x + 1.0;
            let recombined = q.evaluate_real(x) * t4 + r.evaluate_real(x);
            assert_abs_diff_eq!(recombined, p.evaluate_real(x), epsilon = 1e-12);
        }
    }

    #[test]
    fn approximation_respects_interval() {
        let p = Polynomial::approximate(|x| x.exp(), [-2.0, 3.0], 24).unwrap();
        for &x in &[-2.0, -0.5, 1.0, 2.9] {
            assert_abs_diff_eq!(p.evaluate_real(x), x.exp(), epsilon = 1e-9);
        }
    }

    #[test]
    fn empty_polynomial_is_rejected() {
        assert!(Polynomial::monomial(&[]).is_err());
    }
}
