//! Paterson–Stockmeyer decomposition of polynomials.
//!
//! A polynomial of degree `d` is split recursively as `p = q · X^k + r`
//! until every part has degree below the baby-step bound `2^logSplit`. The
//! split is simulated once on `(level, scale)` pairs, which fixes the exact
//! target of every baby step before any ciphertext is touched.
use super::power_basis::PowerBasis;
use super::simulator::{SimEvaluator, SimOperand};
use super::{Arithmetic, Operand};
use crate::errors::{EvalError, EvalResult};
use crate::polynomial::{PolynomialVector, bit_length};
use crate::scale::{SCALE_TOLERANCE_BITS, Scale};
use tracing::debug;

/// Baby-step bound `logSplit` minimising the number of non-scalar
/// multiplications for a polynomial with `log_degree = ceil(log2(d + 1))`.
///
/// # Panics
///
/// Panics if `log_degree` is zero.
pub fn optimal_split(log_degree: usize) -> usize {
    assert!(log_degree > 0, "optimal_split: degree must be at least 1");
    let ld = log_degree as i64;
    let mut log_split = ld >> 1;
    let a = (1i64 << log_split) + (1i64 << (ld - log_split)) + ld - log_split - 3;
    let b = (1i64 << (log_split + 1)) + (1i64 << (ld - log_split - 1)) + ld - log_split - 4;
    if a > b {
        log_split += 1;
    }
    log_split as usize
}

/// A sub-polynomial evaluated directly on the power basis.
#[derive(Debug, Clone, PartialEq)]
pub struct BabyStep {
    pub polynomials: PolynomialVector,
    pub level: usize,
    pub scale: Scale,
    pub lead: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PsNode {
    Leaf(BabyStep),
    /// `quotient · X^power + remainder`.
    Giant {
        power: usize,
        quotient: Box<PsNode>,
        remainder: Box<PsNode>,
    },
}

impl PsNode {
    fn collect<'a>(&'a self, out: &mut Vec<&'a BabyStep>) {
        match self {
            PsNode::Leaf(step) => out.push(step),
            PsNode::Giant {
                quotient,
                remainder,
                ..
            } => {
                quotient.collect(out);
                remainder.collect(out);
            }
        }
    }

    fn collect_powers(&self, out: &mut Vec<usize>) {
        if let PsNode::Giant {
            power,
            quotient,
            remainder,
        } = self
        {
            out.push(*power);
            quotient.collect_powers(out);
            remainder.collect_powers(out);
        }
    }
}

/// Compiled decomposition of a [`PolynomialVector`], every baby step tagged
/// with the level and scale the real evaluation must produce.
#[derive(Debug, Clone, PartialEq)]
pub struct PatersonStockmeyerPolynomial {
    pub degree: usize,
    /// Baby-step bound `2^logSplit`.
    pub base: usize,
    /// Level of the input.
    pub level: usize,
    /// Scale of the final output.
    pub scale: Scale,
    pub root: PsNode,
}

impl PatersonStockmeyerPolynomial {
    /// Simulates the evaluation of `polys` on an input at
    /// `(input_level, input_scale)` so that the output lands on `target_scale`.
    pub fn new(
        sim: &SimEvaluator,
        input_level: usize,
        input_scale: Scale,
        target_scale: Scale,
        polys: &PolynomialVector,
    ) -> EvalResult<Self> {
        let degree = polys.degree();
        if degree == 0 {
            return Err(EvalError::invalid("polynomial degree must be at least 1"));
        }
        let lcr = sim.levels_consumed_per_rescaling();
        let log_degree = bit_length(degree);
        let log_split = optimal_split(log_degree);
        let required = lcr * log_degree;
        if input_level < required {
            return Err(EvalError::InsufficientLevel {
                operation: "paterson_stockmeyer",
                level: input_level,
                required,
            });
        }

        let mut pb = PowerBasis::new(SimOperand::new(input_level, input_scale), polys.basis());
        pb.gen_power(1 << (log_degree - 1), false, sim)?;
        for i in (3..1usize << log_split).rev() {
            pb.gen_power(i, false, sim)?;
        }

        let target_level = input_level - lcr * (log_degree - 1);
        debug!(
            degree,
            log_split, target_level, %target_scale, "paterson-stockmeyer split"
        );

        let recursion = Recursion {
            sim,
            pb: &pb,
            max_degree: degree,
        };
        let (root, _) = recursion.recurse(
            log_split,
            target_level,
            target_scale,
            polys.clone(),
            true,
        )?;

        Ok(Self {
            degree,
            base: 1 << log_split,
            level: input_level,
            scale: target_scale,
            root,
        })
    }

    /// Baby steps in evaluation order, highest degree part first.
    pub fn baby_steps(&self) -> Vec<&BabyStep> {
        let mut steps = Vec::new();
        self.root.collect(&mut steps);
        steps
    }

    /// Giant-step powers used to recombine the baby steps.
    pub fn giant_powers(&self) -> Vec<usize> {
        let mut powers = Vec::new();
        self.root.collect_powers(&mut powers);
        powers.sort_unstable();
        powers.dedup();
        powers
    }
}

struct Recursion<'a> {
    sim: &'a SimEvaluator,
    pb: &'a PowerBasis<SimOperand>,
    max_degree: usize,
}

impl Recursion<'_> {
    fn recurse(
        &self,
        log_split: usize,
        level: usize,
        scale: Scale,
        polys: PolynomialVector,
        lead: bool,
    ) -> EvalResult<(PsNode, SimOperand)> {
        let degree = polys.degree();
        if degree < 1 << log_split {
            // A leading part close to the next power of two is split again,
            // otherwise its highest baby-step power would not be deep enough.
            let max = self.max_degree;
            if lead && log_split > 1 && max > (1 << bit_length(max)) - (1 << (log_split - 1)) {
                let log_split = optimal_split(bit_length(degree));
                return self.recurse(log_split, level, scale, polys, lead);
            }
            let (level, scale) = self.sim.update_level_and_scale_baby_step(lead, level, scale);
            let step = BabyStep {
                polynomials: polys,
                level,
                scale,
                lead,
            };
            return Ok((PsNode::Leaf(step), SimOperand::new(level, scale)));
        }

        let mut power = 1 << log_split;
        while power < (degree >> 1) + 1 {
            power <<= 1;
        }
        let xpow = *self.pb.get(power)?;
        let (quotient, remainder) = polys.factorize(power);

        let (q_level, q_scale) =
            self.sim
                .update_level_and_scale_giant_step(lead, level, scale, xpow.scale);
        let (quotient, mut res) = self.recurse(log_split, q_level, q_scale, quotient, lead)?;
        if res.degree == 2 {
            self.sim.relinearize(&mut res)?;
        }
        self.sim.rescale(&mut res)?;
        let res = self.sim.mul(&res, Operand::Ciphertext(&xpow))?;

        let (remainder, tmp) = self.recurse(log_split, res.level, res.scale, remainder, false)?;
        if !tmp.scale.in_delta(res.scale, SCALE_TOLERANCE_BITS) {
            panic!(
                "paterson-stockmeyer: remainder scale {} != quotient scale {}",
                tmp.scale, res.scale
            );
        }

        let node = PsNode::Giant {
            power,
            quotient: Box::new(quotient),
            remainder: Box::new(remainder),
        };
        Ok((node, res))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Parameters, Precision};
    use crate::polynomial::Polynomial;
    use std::sync::Arc;

    fn sim(precision: Precision, levels: usize) -> SimEvaluator {
        let mut log_q = vec![55];
        log_q.extend(std::iter::repeat_n(45, levels));
        let params = Parameters::builder()
            .log_n(10)
            .log_q(log_q)
            .precision(precision)
            .log_default_scale(if precision == Precision::Prec64 { 45 } else { 90 })
            .build()
            .unwrap();
        SimEvaluator::new(Arc::new(params))
    }

    fn dense(degree: usize) -> PolynomialVector {
        let coeffs: Vec<f64> = (0..=degree).map(|i| 1.0 / (i + 1) as f64).collect();
        Polynomial::monomial(&coeffs).unwrap().into()
    }

    #[test]
    fn optimal_split_values() {
        assert_eq!(optimal_split(1), 1);
        assert_eq!(optimal_split(2), 1);
        assert_eq!(optimal_split(3), 2);
        assert_eq!(optimal_split(4), 2);
        assert_eq!(optimal_split(6), 3);
    }

    #[test]
    fn degree_seven_uses_both_giant_powers() {
        let sim = sim(Precision::Prec64, 6);
        let scale = sim.parameters().default_scale();
        let ps = PatersonStockmeyerPolynomial::new(&sim, 6, scale, scale, &dense(7)).unwrap();
        assert_eq!(ps.base, 4);
        assert_eq!(ps.giant_powers(), vec![2, 4]);
        let steps = ps.baby_steps();
        assert!(steps[0].lead);
        assert!(steps.iter().skip(1).all(|s| !s.lead));
        let total: usize = steps.iter().map(|s| s.polynomials.degree() + 1).sum();
        assert_eq!(total, 8);
        // every baby step sits at or below the input level
        assert!(steps.iter().all(|s| s.level <= 6));
    }

    #[test]
    fn leading_baby_step_is_lifted_by_one_rescale() {
        let sim = sim(Precision::Prec64, 4);
        let scale = sim.parameters().default_scale();
        let ps = PatersonStockmeyerPolynomial::new(&sim, 4, scale, scale, &dense(1)).unwrap();
        let PsNode::Leaf(step) = &ps.root else {
            panic!("degree one must be a single baby step");
        };
        assert_eq!(step.level, 4);
        assert_eq!(step.scale, scale * sim.parameters().q()[4] as f64);
    }

    #[test]
    fn insufficient_level_is_reported() {
        let sim = sim(Precision::Prec64, 6);
        let scale = sim.parameters().default_scale();
        let err = PatersonStockmeyerPolynomial::new(&sim, 2, scale, scale, &dense(7)).unwrap_err();
        assert_eq!(
            err,
            EvalError::InsufficientLevel {
                operation: "paterson_stockmeyer",
                level: 2,
                required: 3
            }
        );
    }

    #[test]
    fn nested_giant_steps_plan_linear_products() {
        let sim = sim(Precision::Prec64, 8);
        let scale = sim.parameters().default_scale();
        for degree in [7, 15, 31, 63, 127] {
            let ps = PatersonStockmeyerPolynomial::new(&sim, 8, scale, scale, &dense(degree))
                .unwrap();
            assert_eq!(ps.degree, degree);
            assert!(!ps.giant_powers().is_empty());
        }
    }

    #[test]
    fn double_word_precision_simulates_consistently() {
        let sim = sim(Precision::Prec128, 12);
        let scale = sim.parameters().default_scale();
        for degree in [3, 8, 15, 31] {
            let ps = PatersonStockmeyerPolynomial::new(&sim, 12, scale, scale, &dense(degree))
                .unwrap();
            assert_eq!(ps.degree, degree);
        }
    }
}
