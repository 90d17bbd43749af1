use super::ensure_levels;
use super::minimax::{MinimaxCompositePolynomial, MinimaxCompositePolynomialEvaluator};
use crate::errors::{EvalResult, ResultExt};
use crate::he::{Bootstrapper, Element, Operand, Rotation};
use tracing::instrument;

/// Sign, step, maximum and minimum of encrypted values in `[-1, 1]`.
///
/// Inputs closer to zero than the `alpha` of the sign approximation give
/// unspecified results.
pub struct ComparisonEvaluator<'a, E: Rotation> {
    minimax: MinimaxCompositePolynomialEvaluator<'a, E>,
    sign: MinimaxCompositePolynomial,
    step: MinimaxCompositePolynomial,
}

impl<'a, E: Rotation> ComparisonEvaluator<'a, E> {
    pub fn new(
        eval: E,
        bootstrapper: Option<&'a dyn Bootstrapper<E::Ciphertext>>,
        sign: MinimaxCompositePolynomial,
    ) -> Self {
        let step = sign.step();
        Self {
            minimax: MinimaxCompositePolynomialEvaluator::new(eval, bootstrapper),
            sign,
            step,
        }
    }

    pub fn evaluator(&self) -> &E {
        self.minimax.evaluator()
    }

    pub fn shallow_copy(&self) -> Self {
        Self {
            minimax: self.minimax.shallow_copy(),
            sign: self.sign.clone(),
            step: self.step.clone(),
        }
    }

    /// `-1`, `1` depending on the sign of each slot.
    #[instrument(skip_all, fields(level = ct.level()))]
    pub fn sign(&self, ct: &E::Ciphertext) -> EvalResult<E::Ciphertext> {
        self.minimax.evaluate(ct, &self.sign).context("sign")
    }

    /// `0` for negative slots, `1` for positive ones.
    #[instrument(skip_all, fields(level = ct.level()))]
    pub fn step(&self, ct: &E::Ciphertext) -> EvalResult<E::Ciphertext> {
        self.minimax.evaluate(ct, &self.step).context("step")
    }

    /// Slot-wise maximum, `b + step(a - b) · (a - b)`. `a - b` must lie in `[-1, 1]`.
    #[instrument(skip_all, fields(level = a.level().min(b.level())))]
    pub fn max(&self, a: &E::Ciphertext, b: &E::Ciphertext) -> EvalResult<E::Ciphertext> {
        let eval = self.evaluator();
        let diff = eval.sub(a, Operand::Ciphertext(b))?;
        let gated = self.gated(&diff).context("max")?;
        eval.add(&gated, Operand::Ciphertext(b))
    }

    /// Slot-wise minimum, `a - step(a - b) · (a - b)`.
    #[instrument(skip_all, fields(level = a.level().min(b.level())))]
    pub fn min(&self, a: &E::Ciphertext, b: &E::Ciphertext) -> EvalResult<E::Ciphertext> {
        let eval = self.evaluator();
        let diff = eval.sub(a, Operand::Ciphertext(b))?;
        let gated = self.gated(&diff).context("min")?;
        eval.sub(a, Operand::Ciphertext(&gated))
    }

    /// `step(diff) · diff`, rescaled.
    fn gated(&self, diff: &E::Ciphertext) -> EvalResult<E::Ciphertext> {
        let eval = self.evaluator();
        let mut step = self.minimax.evaluate(diff, &self.step)?;
        let lcr = eval.levels_consumed_per_rescaling();
        ensure_levels(self.minimax.bootstrapper(), &mut step, lcr, "comparison")?;
        let mut out = eval.mul_relin(&step, Operand::Ciphertext(diff))?;
        eval.rescale(&mut out)?;
        Ok(out)
    }
}
