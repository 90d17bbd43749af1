use super::ensure_levels;
use crate::errors::{EvalError, EvalResult};
use crate::he::{Bootstrapper, Element, PolynomialEvaluator, Rotation};
use crate::math::odd_sign_minimax;
use crate::params::RingType;
use crate::polynomial::{Basis, Polynomial};
use tracing::{debug, instrument};

/// Stages are no longer added once the chain is this close to `sign`.
const SATURATION: f64 = 1e-10;

/// Polynomials applied one after the other, `p_n(…p_2(p_1(x)))`.
///
/// Every stage is a Chebyshev series on `[-1, 1]` whose image stays within
/// `[-1, 1]`, so each output is a valid input of the next stage.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimaxCompositePolynomial {
    stages: Vec<Polynomial>,
    /// Bound on `|chain(x) - sign(x)|` for `|x|` in `[alpha, 1]`.
    max_error: f64,
}

impl MinimaxCompositePolynomial {
    pub fn new(stages: Vec<Polynomial>, max_error: f64) -> EvalResult<Self> {
        if stages.is_empty() {
            return Err(EvalError::invalid("composite polynomial has no stage"));
        }
        if stages.iter().any(|p| p.degree() == 0) {
            return Err(EvalError::invalid("composite polynomial stages must have degree >= 1"));
        }
        Ok(Self { stages, max_error })
    }

    /// Approximation of `sign` on `[-1, -2^-log_alpha] ∪ [2^-log_alpha, 1]`.
    ///
    /// Stage `i` is the odd minimax polynomial of degree `degrees[i]` for the
    /// interval left by the previous stages, divided by its peak on `[-1, 1]`
    /// so that it never exceeds 1. Trailing degrees are dropped once the chain is saturated.
    pub fn sign(log_alpha: u32, degrees: &[usize]) -> EvalResult<Self> {
        if degrees.is_empty() {
            return Err(EvalError::invalid("sign approximation needs at least one degree"));
        }
        let mut alpha = (-(log_alpha as f64)).exp2();
        let mut stages = Vec::with_capacity(degrees.len());
        for &degree in degrees {
            if 1.0 - alpha < SATURATION {
                break;
            }
            let minimax = odd_sign_minimax(alpha, degree).ok_or_else(|| {
                EvalError::invalid(format!(
                    "no odd minimax sign approximation of degree {degree} on [{alpha:e}, 1]"
                ))
            })?;
            let (low, peak) = minimax.range(alpha);
            if low <= 0.0 {
                return Err(EvalError::invalid(format!(
                    "degree {degree} cannot separate [{alpha:e}, 1] from zero"
                )));
            }
            let coeffs: Vec<f64> = minimax.coeffs.iter().map(|c| c / peak).collect();
            stages.push(Polynomial::chebyshev(&coeffs, [-1.0, 1.0])?);
            debug!(degree, alpha, error = minimax.max_error, peak, "minimax sign stage");
            alpha = low / peak;
        }
        Self::new(stages, 1.0 - alpha)
    }

    /// `(sign + 1) / 2`, folded into the last stage.
    pub fn step(&self) -> Self {
        let mut stages = self.stages.clone();
        if let Some(last) = stages.last_mut() {
            *last = last.affine(0.5, 0.5);
        }
        Self {
            stages,
            max_error: 0.5 * self.max_error,
        }
    }

    pub fn stages(&self) -> &[Polynomial] {
        &self.stages
    }

    pub fn max_error(&self) -> f64 {
        self.max_error
    }

    /// Rescales consumed by the whole chain.
    pub fn depth(&self) -> usize {
        self.stages.iter().map(Polynomial::depth).sum()
    }

    pub fn evaluate_plain(&self, x: f64) -> f64 {
        self.stages.iter().fold(x, |x, p| p.evaluate_real(x))
    }
}

/// Evaluates composite polynomials stage by stage, bootstrapping between
/// stages when the next one would not fit.
pub struct MinimaxCompositePolynomialEvaluator<'a, E: Rotation> {
    poly_eval: PolynomialEvaluator<E>,
    bootstrapper: Option<&'a dyn Bootstrapper<E::Ciphertext>>,
}

impl<'a, E: Rotation> MinimaxCompositePolynomialEvaluator<'a, E> {
    pub fn new(eval: E, bootstrapper: Option<&'a dyn Bootstrapper<E::Ciphertext>>) -> Self {
        Self {
            poly_eval: PolynomialEvaluator::new(eval),
            bootstrapper,
        }
    }

    pub fn evaluator(&self) -> &E {
        self.poly_eval.evaluator()
    }

    pub fn bootstrapper(&self) -> Option<&'a dyn Bootstrapper<E::Ciphertext>> {
        self.bootstrapper
    }

    pub fn shallow_copy(&self) -> Self {
        Self {
            poly_eval: self.poly_eval.shallow_copy(),
            bootstrapper: self.bootstrapper,
        }
    }

    /// Applies every stage of `mcp` to `ct`, which must decode into `[-1, 1]`.
    ///
    /// In the standard ring each stage is evaluated at half the scale and
    /// added to its conjugate, which keeps only the real part.
    #[instrument(skip_all, fields(stages = mcp.stages.len(), level = ct.level()))]
    pub fn evaluate(
        &self,
        ct: &E::Ciphertext,
        mcp: &MinimaxCompositePolynomial,
    ) -> EvalResult<E::Ciphertext> {
        let eval = self.poly_eval.evaluator();
        let lcr = eval.levels_consumed_per_rescaling();
        let standard = eval.parameters().ring_type() == RingType::Standard;

        let mut res = ct.clone();
        for poly in &mcp.stages {
            if poly.basis != Basis::Chebyshev {
                return Err(EvalError::invalid("composite stages must be Chebyshev series"));
            }
            ensure_levels(self.bootstrapper, &mut res, lcr * poly.depth(), "minimax_composite")?;

            let scale = res.scale();
            if standard {
                res = self.poly_eval.evaluate(&res, poly, scale / 2.0)?;
                let conj = eval.conjugate(&res)?;
                eval.add_assign(&mut res, (&conj).into())?;
                res.set_scale(scale);
            } else {
                res = self.poly_eval.evaluate(&res, poly, scale)?;
            }
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sign_chain_converges() {
        let mcp = MinimaxCompositePolynomial::sign(6, &[15, 15, 15]).unwrap();
        assert_eq!(mcp.stages().len(), 3);
        assert_eq!(mcp.depth(), 12);
        assert!(mcp.max_error() < 1e-9);
        for x in [2f64.powi(-6), 0.1, 0.5, 1.0] {
            assert_abs_diff_eq!(mcp.evaluate_plain(x), 1.0, epsilon = 1e-9);
            assert_abs_diff_eq!(mcp.evaluate_plain(-x), -1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn saturated_chains_drop_trailing_stages() {
        let mcp = MinimaxCompositePolynomial::sign(6, &[15, 15, 15, 15, 15]).unwrap();
        assert_eq!(mcp.stages().len(), 3);
    }

    #[test]
    fn stages_stay_in_the_unit_interval() {
        let mcp = MinimaxCompositePolynomial::sign(8, &[15, 15, 15, 15]).unwrap();
        for stage in mcp.stages() {
            for i in 0..=20_000 {
                let x = -1.0 + i as f64 / 10_000.0;
                assert!(stage.evaluate_real(x).abs() <= 1.0 + 1e-12, "x = {x}");
            }
        }
    }

    #[test]
    fn step_folds_into_the_last_stage() {
        let sign = MinimaxCompositePolynomial::sign(6, &[15, 15, 15]).unwrap();
        let step = sign.step();
        assert_eq!(step.depth(), sign.depth());
        assert_abs_diff_eq!(step.evaluate_plain(0.3), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(step.evaluate_plain(-0.3), 0.0, epsilon = 1e-9);
        assert!(!step.stages()[2].is_odd);
    }

    #[test]
    fn empty_degrees_are_rejected() {
        assert!(MinimaxCompositePolynomial::sign(6, &[]).is_err());
        assert!(MinimaxCompositePolynomial::sign(6, &[14]).is_err());
    }
}
