//! Encrypted inverses.
//!
//! `1/x` is computed with Goldschmidt's division on `(0, 2)`. Larger inputs
//! are first pulled into `[-1, 1]` by [`InverseEvaluator::interval_normalization`],
//! and inputs of either sign go through their absolute value, obtained with
//! a composite sign approximation.
use super::minimax::{MinimaxCompositePolynomial, MinimaxCompositePolynomialEvaluator};
use super::{ensure_levels, ensure_levels_many};
use crate::errors::{EvalError, EvalResult, ResultExt};
use crate::he::{Bootstrapper, Element, Operand, Rotation};
use tracing::{debug, instrument};

/// Interval compression per normalization round.
pub const NORMALIZATION_FACTOR: f64 = 2.45;

/// Goldschmidt iterations needed for `prec_bits` bits of precision on inputs
/// in `[2^log2min, 2 - 2^log2min]`.
///
/// The initial error `|1 - x|` is at most `1 - 2^log2min` and squares with
/// every iteration.
pub fn goldschmidt_iterations(log2min: f64, prec_bits: f64) -> usize {
    let mut start = (1.0 - log2min.exp2()).log2();
    let mut iterations = 1;
    while start + prec_bits > 0.5 {
        start *= 2.0;
        iterations += 1;
    }
    iterations
}

/// Number of normalization rounds for inputs bounded by `2^log2max`.
pub fn normalization_rounds(log2max: f64) -> usize {
    (log2max / NORMALIZATION_FACTOR.log2()).ceil().max(0.0) as usize
}

pub struct InverseEvaluator<'a, E: Rotation> {
    minimax: MinimaxCompositePolynomialEvaluator<'a, E>,
}

impl<'a, E: Rotation> InverseEvaluator<'a, E> {
    pub fn new(eval: E, bootstrapper: Option<&'a dyn Bootstrapper<E::Ciphertext>>) -> Self {
        Self {
            minimax: MinimaxCompositePolynomialEvaluator::new(eval, bootstrapper),
        }
    }

    pub fn evaluator(&self) -> &E {
        self.minimax.evaluator()
    }

    pub fn shallow_copy(&self) -> Self {
        Self {
            minimax: self.minimax.shallow_copy(),
        }
    }

    fn bootstrapper(&self) -> Option<&'a dyn Bootstrapper<E::Ciphertext>> {
        self.minimax.bootstrapper()
    }

    /// `1/x` for `|x|` in `[2^log2min, 2^log2max]`, whatever the sign of `x`.
    /// `sign` must separate `2^log2min` from zero.
    #[instrument(skip_all, fields(level = ct.level(), log2min, log2max))]
    pub fn evaluate_full_domain(
        &self,
        ct: &E::Ciphertext,
        log2min: f64,
        log2max: f64,
        sign: &MinimaxCompositePolynomial,
    ) -> EvalResult<E::Ciphertext> {
        self.evaluate(ct, log2min, log2max, Some(sign))
            .context("inverse_full_domain")
    }

    /// `1/x` for `x` in `[2^log2min, 2^log2max]`.
    #[instrument(skip_all, fields(level = ct.level(), log2min, log2max))]
    pub fn evaluate_positive_domain(
        &self,
        ct: &E::Ciphertext,
        log2min: f64,
        log2max: f64,
    ) -> EvalResult<E::Ciphertext> {
        self.evaluate(ct, log2min, log2max, None)
            .context("inverse_positive_domain")
    }

    /// `1/x` for `x` in `[-2^log2max, -2^log2min]`.
    #[instrument(skip_all, fields(level = ct.level(), log2min, log2max))]
    pub fn evaluate_negative_domain(
        &self,
        ct: &E::Ciphertext,
        log2min: f64,
        log2max: f64,
    ) -> EvalResult<E::Ciphertext> {
        let eval = self.evaluator();
        let neg = eval.neg(ct);
        let inv = self
            .evaluate(&neg, log2min, log2max, None)
            .context("inverse_negative_domain")?;
        Ok(eval.neg(&inv))
    }

    fn evaluate(
        &self,
        ct: &E::Ciphertext,
        log2min: f64,
        log2max: f64,
        sign: Option<&MinimaxCompositePolynomial>,
    ) -> EvalResult<E::Ciphertext> {
        if !(log2min < 0.0) || log2max < log2min {
            return Err(EvalError::invalid(format!(
                "inverse domain bounds 2^{log2min}, 2^{log2max} must satisfy 0 < min < 1, min <= max"
            )));
        }
        let eval = self.evaluator();
        let btp = self.bootstrapper();
        let lcr = eval.levels_consumed_per_rescaling();

        let (mut x, normalization) = if normalization_rounds(log2max) > 0 {
            let (x, factor) = self.interval_normalization(ct, log2max)?;
            (x, Some(factor))
        } else {
            (ct.clone(), None)
        };

        let sign = match sign {
            Some(mcp) => {
                let mut s = self.minimax.evaluate(&x, mcp)?;
                ensure_levels(btp, &mut s, lcr, "inverse")?;
                ensure_levels(btp, &mut x, lcr, "inverse")?;
                x = eval.mul_relin(&x, Operand::Ciphertext(&s))?;
                eval.rescale(&mut x)?;
                Some(s)
            }
            None => None,
        };

        let mut inv = self.goldschmidt_division(&x, log2min)?;

        for mut factor in normalization.into_iter().chain(sign) {
            ensure_levels(btp, &mut inv, lcr, "inverse")?;
            ensure_levels(btp, &mut factor, lcr, "inverse")?;
            inv = eval.mul_relin(&inv, Operand::Ciphertext(&factor))?;
            eval.rescale(&mut inv)?;
        }
        Ok(inv)
    }

    /// `1/x` for `x` in `[2^log2min, 2 - 2^log2min]`, with as many iterations
    /// as the default scale can resolve.
    pub fn goldschmidt_division(
        &self,
        ct: &E::Ciphertext,
        log2min: f64,
    ) -> EvalResult<E::Ciphertext> {
        let prec = self.evaluator().parameters().log_default_scale() as f64;
        self.goldschmidt_division_iterations(ct, goldschmidt_iterations(log2min, prec))
    }

    /// Goldschmidt's division with a fixed number of iterations:
    /// `a_0 = 2 - x`, `b_0 = 1 - x`, then `b ← b²` and `a ← a · (1 + b)`.
    ///
    /// The relative error after `n` iterations is `(1 - x)^(2^n)`.
    #[instrument(skip_all, fields(level = ct.level(), iterations))]
    pub fn goldschmidt_division_iterations(
        &self,
        ct: &E::Ciphertext,
        iterations: usize,
    ) -> EvalResult<E::Ciphertext> {
        let eval = self.evaluator();
        let btp = self.bootstrapper();
        let lcr = eval.levels_consumed_per_rescaling();
        let depth = iterations * lcr;
        if btp.is_none() && ct.level() < depth {
            return Err(EvalError::MissingBootstrapper {
                operation: "goldschmidt_division",
                level: ct.level(),
                required: depth,
            });
        }

        let mut a = eval.neg(ct);
        let mut b = a.clone();
        eval.add_assign(&mut a, Operand::real(2.0))?;
        eval.add_assign(&mut b, Operand::real(1.0))?;

        for _ in 1..iterations {
            ensure_levels(btp, &mut b, lcr, "goldschmidt_division")?;
            b = eval.mul_relin(&b, Operand::Ciphertext(&b))?;
            eval.rescale(&mut b)?;

            ensure_levels(btp, &mut b, lcr, "goldschmidt_division")?;
            ensure_levels(btp, &mut a, lcr, "goldschmidt_division")?;
            let b1 = eval.add(&b, Operand::real(1.0))?;
            a = eval.mul_relin(&a, Operand::Ciphertext(&b1))?;
            eval.rescale(&mut a)?;
        }
        Ok(a)
    }

    /// Maps `[-2^log2max, 2^log2max]` into `[-1, 1]` with rounds of
    /// `x ← x · (1 - c·x²)`, returning the normalized value and the product
    /// of the factors `1 - c·x²`, so that `1/x = factor / normalized`.
    ///
    /// Round `i` of `n` uses `c = 4 / (27 · L^(2(n-1-i)))` with
    /// `L` = [`NORMALIZATION_FACTOR`], which maps `[-3R, 3R]` into `[-R, R]`
    /// for `R = L^(n-1-i)` while leaving small values nearly unchanged.
    #[instrument(skip_all, fields(level = ct.level(), log2max))]
    pub fn interval_normalization(
        &self,
        ct: &E::Ciphertext,
        log2max: f64,
    ) -> EvalResult<(E::Ciphertext, E::Ciphertext)> {
        let rounds = normalization_rounds(log2max);
        if rounds == 0 {
            return Err(EvalError::invalid(format!(
                "interval 2^{log2max} is already normalized"
            )));
        }
        let eval = self.evaluator();
        let btp = self.bootstrapper();
        let lcr = eval.levels_consumed_per_rescaling();

        let mut x = ct.clone();
        let mut factor: Option<E::Ciphertext> = None;
        for i in 0..rounds {
            let r = NORMALIZATION_FACTOR.powi((rounds - 1 - i) as i32);
            let c = 4.0 / (27.0 * r * r);
            debug!(round = i, c, "interval normalization");

            match factor.take() {
                Some(f) => {
                    let mut joint = [x, f];
                    ensure_levels_many(btp, &mut joint, 3 * lcr, "interval_normalization")?;
                    let [nx, nf] = joint;
                    x = nx;
                    factor = Some(nf);
                }
                None => ensure_levels(btp, &mut x, 3 * lcr, "interval_normalization")?,
            }

            let mut t = eval.mul_relin(&x, Operand::Ciphertext(&x))?;
            eval.rescale(&mut t)?;
            eval.mul_assign(&mut t, Operand::real(-c))?;
            eval.rescale(&mut t)?;
            eval.add_assign(&mut t, Operand::real(1.0))?;

            x = eval.mul_relin(&x, Operand::Ciphertext(&t))?;
            eval.rescale(&mut x)?;
            factor = Some(match factor {
                Some(f) => {
                    let mut f = eval.mul_relin(&f, Operand::Ciphertext(&t))?;
                    eval.rescale(&mut f)?;
                    f
                }
                None => t,
            });
        }
        let factor = factor.ok_or_else(|| EvalError::invalid("no normalization round ran"))?;
        Ok((x, factor))
    }

    /// `1/√x` by Newton's iteration `y ← y · (3/2 - x/2 · y²)` from the
    /// constant `initial`: one level to halve `x`, then two per iteration.
    ///
    /// Converges when `0 < initial · √x < √3`.
    #[instrument(skip_all, fields(level = ct.level(), iterations))]
    pub fn inv_sqrt(
        &self,
        ct: &E::Ciphertext,
        initial: f64,
        iterations: usize,
    ) -> EvalResult<E::Ciphertext> {
        let eval = self.evaluator();
        let btp = self.bootstrapper();
        let lcr = eval.levels_consumed_per_rescaling();

        let mut half = ct.clone();
        ensure_levels(btp, &mut half, lcr, "inv_sqrt")?;
        half = eval.mul(&half, Operand::real(0.5))?;
        eval.rescale(&mut half)?;
        let mut y = eval.new_ciphertext(1, half.level(), half.scale());
        eval.add_assign(&mut y, Operand::real(initial))?;

        for _ in 0..iterations {
            ensure_levels(btp, &mut y, 2 * lcr, "inv_sqrt")?;
            ensure_levels(btp, &mut half, 2 * lcr, "inv_sqrt")?;

            let mut xy = eval.mul_relin(&half, Operand::Ciphertext(&y))?;
            eval.rescale(&mut xy)?;
            let mut yy = eval.mul_relin(&y, Operand::Ciphertext(&y))?;
            eval.rescale(&mut yy)?;

            // x/2 · y³, combined with 3/2 · y before the rescale
            let cube = eval.mul_relin(&xy, Operand::Ciphertext(&yy))?;
            let mut next = eval.neg(&cube);
            eval.mul_then_add(&y, Operand::real(1.5), &mut next)?;
            eval.rescale(&mut next)?;
            y = next;
        }
        Ok(y)
    }
}
