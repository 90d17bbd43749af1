//! Level and scale simulation.
//!
//! [`SimEvaluator`] follows the exact level/scale arithmetic of a real
//! backend on [`SimOperand`]s that carry no data. The polynomial evaluator
//! runs it once before touching any ciphertext to fix the target level and
//! scale of every baby step.
use super::{Arithmetic, Element, Operand};
use crate::errors::{EvalError, EvalResult};
use crate::params::Parameters;
use crate::polynomial::bit_length;
use crate::scale::{Scale, added_scale};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimOperand {
    pub level: usize,
    pub degree: usize,
    pub scale: Scale,
}

impl SimOperand {
    pub fn new(level: usize, scale: Scale) -> Self {
        Self {
            level,
            degree: 1,
            scale,
        }
    }
}

impl Element for SimOperand {
    fn level(&self) -> usize {
        self.level
    }

    fn degree(&self) -> usize {
        self.degree
    }

    fn scale(&self) -> Scale {
        self.scale
    }

    fn set_scale(&mut self, scale: Scale) {
        self.scale = scale;
    }
}

#[derive(Debug, Clone)]
pub struct SimEvaluator {
    params: Arc<Parameters>,
}

impl SimEvaluator {
    pub fn new(params: Arc<Parameters>) -> Self {
        Self { params }
    }

    /// Levels consumed by evaluating a polynomial of the given degree.
    pub fn polynomial_depth(&self, degree: usize) -> usize {
        self.levels_consumed_per_rescaling() * bit_length(degree)
    }

    /// Target of a baby step. The leading baby step is evaluated one rescale
    /// above its target so that the final rescale lands on it.
    pub fn update_level_and_scale_baby_step(
        &self,
        lead: bool,
        level: usize,
        scale: Scale,
    ) -> (usize, Scale) {
        if lead {
            (level, scale * self.params.rescale_factor(level))
        } else {
            (level, scale)
        }
    }

    /// Target of the quotient of a giant step `q · X^k + r` evaluated at
    /// `(level, scale)`, where `X^k` has scale `xpow_scale`.
    pub fn update_level_and_scale_giant_step(
        &self,
        lead: bool,
        level: usize,
        scale: Scale,
        xpow_scale: Scale,
    ) -> (usize, Scale) {
        let lcr = self.levels_consumed_per_rescaling();
        let qi = if lead {
            self.params.rescale_factor(level)
        } else {
            self.params.rescale_factor(level + lcr)
        };
        (level + lcr, scale * qi / xpow_scale)
    }

    fn scalar_scale(&self, op0: &SimOperand, out: &SimOperand) -> EvalResult<(usize, Scale)> {
        let level = op0.level.min(out.level);
        if op0.scale == out.scale {
            Ok((level, out.scale * self.params.rescale_factor(level)))
        } else if op0.scale < out.scale {
            Ok((level, out.scale))
        } else {
            Err(EvalError::ScalePrecondition {
                operation: "mul_then_add",
                op_scale: op0.scale.value(),
                out_scale: out.scale.value(),
            })
        }
    }
}

impl Arithmetic for SimEvaluator {
    type Ciphertext = SimOperand;

    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn shallow_copy(&self) -> Self {
        self.clone()
    }

    fn new_ciphertext(&self, degree: usize, level: usize, scale: Scale) -> SimOperand {
        SimOperand {
            level,
            degree,
            scale,
        }
    }

    fn add(&self, op0: &SimOperand, op1: Operand<'_, SimOperand>) -> EvalResult<SimOperand> {
        Ok(match op1 {
            Operand::Ciphertext(op1) => SimOperand {
                level: op0.level.min(op1.level),
                degree: op0.degree.max(op1.degree),
                scale: added_scale(op0.scale, op1.scale),
            },
            Operand::Scalar(_) | Operand::Vector(_) => *op0,
        })
    }

    fn sub(&self, op0: &SimOperand, op1: Operand<'_, SimOperand>) -> EvalResult<SimOperand> {
        self.add(op0, op1)
    }

    fn mul(&self, op0: &SimOperand, op1: Operand<'_, SimOperand>) -> EvalResult<SimOperand> {
        match op1 {
            Operand::Ciphertext(op1) => {
                let degree = op0.degree + op1.degree;
                if degree > 2 {
                    return Err(EvalError::invalid(format!(
                        "product of degree {degree} ciphertexts is not supported"
                    )));
                }
                Ok(SimOperand {
                    level: op0.level.min(op1.level),
                    degree,
                    scale: op0.scale * op1.scale,
                })
            }
            Operand::Scalar(_) | Operand::Vector(_) => Ok(SimOperand {
                scale: op0.scale * self.params.rescale_factor(op0.level),
                ..*op0
            }),
        }
    }

    fn mul_then_add(
        &self,
        op0: &SimOperand,
        op1: Operand<'_, SimOperand>,
        out: &mut SimOperand,
    ) -> EvalResult<()> {
        match op1 {
            Operand::Ciphertext(_) => {
                let product = self.mul(op0, op1)?;
                *out = self.add(out, Operand::Ciphertext(&product))?;
            }
            Operand::Scalar(_) | Operand::Vector(_) => {
                let (level, scale) = self.scalar_scale(op0, out)?;
                out.level = level;
                out.scale = scale;
                out.degree = out.degree.max(op0.degree);
            }
        }
        Ok(())
    }

    fn relinearize(&self, ct: &mut SimOperand) -> EvalResult<()> {
        if ct.degree > 2 {
            return Err(EvalError::invalid("cannot relinearize beyond degree 2"));
        }
        ct.degree = ct.degree.min(1);
        Ok(())
    }

    fn rescale(&self, ct: &mut SimOperand) -> EvalResult<()> {
        let lcr = self.levels_consumed_per_rescaling();
        if ct.level < lcr {
            return Err(EvalError::InsufficientLevel {
                operation: "rescale",
                level: ct.level,
                required: lcr,
            });
        }
        ct.scale = ct.scale / self.params.rescale_factor(ct.level);
        ct.level -= lcr;
        Ok(())
    }

    fn drop_level(&self, ct: &mut SimOperand, levels: usize) -> EvalResult<()> {
        if ct.level < levels {
            return Err(EvalError::InsufficientLevel {
                operation: "drop_level",
                level: ct.level,
                required: levels,
            });
        }
        ct.level -= levels;
        Ok(())
    }

    fn neg(&self, ct: &SimOperand) -> SimOperand {
        *ct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Precision;

    fn sim(precision: Precision) -> SimEvaluator {
        let params = Parameters::builder()
            .log_n(10)
            .log_q(vec![55, 45, 45, 45, 45, 45])
            .precision(precision)
            .log_default_scale(if precision == Precision::Prec64 { 45 } else { 90 })
            .build()
            .unwrap();
        SimEvaluator::new(Arc::new(params))
    }

    #[test]
    fn product_then_rescale_restores_scale() {
        let sim = sim(Precision::Prec64);
        let s = sim.parameters().default_scale();
        let x = SimOperand::new(5, s);
        let mut y = sim.mul(&x, Operand::Ciphertext(&x)).unwrap();
        assert_eq!(y.degree, 2);
        assert_eq!(y.scale, s * s);
        sim.relinearize(&mut y).unwrap();
        sim.rescale(&mut y).unwrap();
        assert_eq!(y.level, 4);
        assert_eq!(y.scale, s * s / sim.parameters().q()[5] as f64);
    }

    #[test]
    fn double_word_rescale_drops_two_levels() {
        let sim = sim(Precision::Prec128);
        let mut x = SimOperand::new(5, Scale::from_log2(90.0));
        sim.rescale(&mut x).unwrap();
        assert_eq!(x.level, 3);
        assert_eq!(sim.polynomial_depth(7), 6);
    }

    #[test]
    fn rescale_at_level_zero_is_an_error() {
        let sim = sim(Precision::Prec64);
        let mut x = SimOperand::new(0, Scale::from_log2(45.0));
        assert!(matches!(
            sim.rescale(&mut x),
            Err(EvalError::InsufficientLevel { .. })
        ));
    }

    #[test]
    fn giant_step_then_rescale_lands_on_target() {
        let sim = sim(Precision::Prec64);
        let q = sim.parameters().q().to_vec();
        let target = Scale::from_log2(45.0);
        let xpow = Scale::from_log2(44.5);

        // non-leading: quotient · X^k after a rescale must come back to `target`
        let (level, scale) = sim.update_level_and_scale_giant_step(false, 2, target, xpow);
        assert_eq!(level, 3);
        let mut quotient = SimOperand::new(level, scale);
        sim.rescale(&mut quotient).unwrap();
        let product = sim
            .mul(&quotient, Operand::Ciphertext(&SimOperand::new(4, xpow)))
            .unwrap();
        assert!(product.scale.in_delta(target, 40));
        assert_eq!(product.level, 2);

        let (_, lead) = sim.update_level_and_scale_baby_step(true, 2, target);
        assert_eq!(lead, target * q[2] as f64);
    }

    #[test]
    fn mul_then_add_rejects_larger_input_scale() {
        let sim = sim(Precision::Prec64);
        let x = SimOperand::new(3, Scale::from_log2(50.0));
        let mut out = SimOperand::new(3, Scale::from_log2(45.0));
        let err = sim
            .mul_then_add(&x, Operand::real(0.5), &mut out)
            .unwrap_err();
        assert!(matches!(err, EvalError::ScalePrecondition { .. }));

        let mut same = SimOperand::new(3, x.scale);
        sim.mul_then_add(&x, Operand::real(0.5), &mut same).unwrap();
        assert_eq!(same.scale, x.scale * sim.parameters().q()[3] as f64);
    }
}
