use super::paterson_stockmeyer::{BabyStep, PatersonStockmeyerPolynomial, PsNode, optimal_split};
use super::power_basis::PowerBasis;
use super::simulator::SimEvaluator;
use super::{Arithmetic, Element, Operand};
use crate::errors::{EvalError, EvalResult};
use crate::polynomial::{Polynomial, PolynomialVector, bit_length, is_negligible};
use crate::scale::{SCALE_TOLERANCE_BITS, Scale};
use num_complex::Complex64;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Supplies the coefficients used by baby-step evaluation.
///
/// Implementations may keep scratch state, so a getter serves one
/// evaluation at a time; concurrent evaluations each use a shallow copy.
pub trait CoefficientGetter {
    /// Coefficient of degree `k` of a polynomial applied to every slot.
    fn single(&mut self, p: &Polynomial, k: usize) -> Complex64;

    /// Per-slot coefficients of degree `k` following the vector mapping.
    fn vector(&mut self, polys: &PolynomialVector, k: usize) -> Vec<Complex64>;

    fn shallow_copy(&self) -> Self
    where
        Self: Sized;
}

/// Reads coefficients straight from the polynomials, slot by slot.
#[derive(Debug, Clone)]
pub struct SlotCoefficientGetter {
    slots: usize,
    values: Vec<Complex64>,
}

impl SlotCoefficientGetter {
    pub fn new(slots: usize) -> Self {
        Self {
            slots,
            values: vec![Complex64::new(0.0, 0.0); slots],
        }
    }
}

impl CoefficientGetter for SlotCoefficientGetter {
    fn single(&mut self, p: &Polynomial, k: usize) -> Complex64 {
        p.coeffs[k]
    }

    fn vector(&mut self, polys: &PolynomialVector, k: usize) -> Vec<Complex64> {
        self.values.fill(Complex64::new(0.0, 0.0));
        match &polys.mapping {
            Some(mapping) => {
                for (slot, &i) in mapping.iter().take(self.slots).enumerate() {
                    self.values[slot] = polys.value[i].coeffs[k];
                }
            }
            None => self.values.fill(polys.value[0].coeffs[k]),
        }
        self.values.clone()
    }

    fn shallow_copy(&self) -> Self {
        Self::new(self.slots)
    }
}

/// Homomorphic polynomial evaluation with the Paterson–Stockmeyer algorithm.
#[derive(Debug)]
pub struct PolynomialEvaluator<E> {
    eval: E,
    sim: SimEvaluator,
}

impl<E> PolynomialEvaluator<E>
where
    E: Arithmetic,
{
    pub fn new(eval: E) -> Self {
        let sim = SimEvaluator::new(Arc::new(eval.parameters().clone()));
        Self { eval, sim }
    }

    pub fn evaluator(&self) -> &E {
        &self.eval
    }

    pub fn simulator(&self) -> &SimEvaluator {
        &self.sim
    }

    pub fn shallow_copy(&self) -> Self {
        Self {
            eval: self.eval.shallow_copy(),
            sim: self.sim.clone(),
        }
    }

    /// Evaluates `poly` on `ct`, returning a ciphertext at scale `target_scale`
    /// that sits `levels_consumed_per_rescaling · ceil(log2(d + 1))` levels
    /// below the input.
    ///
    /// Chebyshev polynomials are evaluated on the input as is; use
    /// [`Self::change_of_basis`] first when the interval is not `[-1, 1]`.
    pub fn evaluate(
        &self,
        ct: &E::Ciphertext,
        poly: &Polynomial,
        target_scale: Scale,
    ) -> EvalResult<E::Ciphertext> {
        let mut getter = SlotCoefficientGetter::new(self.eval.parameters().max_slots());
        self.evaluate_vector(ct, &PolynomialVector::single(poly.clone()), target_scale, &mut getter)
    }

    #[instrument(skip_all, fields(degree = polys.degree(), level = ct.level()))]
    pub fn evaluate_vector<G: CoefficientGetter>(
        &self,
        ct: &E::Ciphertext,
        polys: &PolynomialVector,
        target_scale: Scale,
        getter: &mut G,
    ) -> EvalResult<E::Ciphertext> {
        let required = self.sim.polynomial_depth(polys.degree());
        if ct.level() < required {
            return Err(EvalError::InsufficientLevel {
                operation: "evaluate_polynomial",
                level: ct.level(),
                required,
            });
        }
        let mut pb = PowerBasis::new(ct.clone(), polys.basis());
        self.evaluate_from_power_basis(&mut pb, polys, target_scale, getter)
    }

    /// Evaluation on a caller-owned power basis, which may already hold
    /// powers from earlier evaluations and keeps the ones generated here.
    pub fn evaluate_from_power_basis<G: CoefficientGetter>(
        &self,
        pb: &mut PowerBasis<E::Ciphertext>,
        polys: &PolynomialVector,
        target_scale: Scale,
        getter: &mut G,
    ) -> EvalResult<E::Ciphertext> {
        let (level, scale) = {
            let x = pb.get(1)?;
            (x.level(), x.scale())
        };
        if polys.basis() != pb.basis {
            return Err(EvalError::invalid(
                "polynomial basis differs from the power basis",
            ));
        }
        let degree = polys.degree();
        if degree == 0 {
            return Err(EvalError::invalid("polynomial degree must be at least 1"));
        }
        let log_degree = bit_length(degree);
        let log_split = optimal_split(log_degree);
        let (odd, even) = (polys.is_odd(), polys.is_even());

        pb.gen_power(1 << (log_degree - 1), false, &self.eval)?;
        for i in (3..1usize << log_split).rev() {
            if keeps_degree(i, odd, even) {
                pb.gen_power(i, polys.lazy(), &self.eval)?;
            }
        }

        let ps = PatersonStockmeyerPolynomial::new(&self.sim, level, scale, target_scale, polys)?;
        debug!(
            baby_steps = ps.baby_steps().len(),
            giant_powers = ?ps.giant_powers(),
            "evaluating paterson-stockmeyer polynomial"
        );
        self.evaluate_paterson_stockmeyer(&ps, pb, getter)
    }

    pub fn evaluate_paterson_stockmeyer<G: CoefficientGetter>(
        &self,
        ps: &PatersonStockmeyerPolynomial,
        pb: &PowerBasis<E::Ciphertext>,
        getter: &mut G,
    ) -> EvalResult<E::Ciphertext> {
        let mut res = self.evaluate_node(&ps.root, pb, getter)?;
        if res.degree() == 2 {
            self.eval.relinearize(&mut res)?;
        }
        self.eval.rescale(&mut res)?;
        Ok(res)
    }

    fn evaluate_node<G: CoefficientGetter>(
        &self,
        node: &PsNode,
        pb: &PowerBasis<E::Ciphertext>,
        getter: &mut G,
    ) -> EvalResult<E::Ciphertext> {
        match node {
            PsNode::Leaf(step) => self.evaluate_baby_step(step, pb, getter),
            PsNode::Giant {
                power,
                quotient,
                remainder,
            } => {
                let mut b = self.evaluate_node(quotient, pb, getter)?;
                let a = self.evaluate_node(remainder, pb, getter)?;
                self.evaluate_monomial(&a, &mut b, pb.get(*power)?)?;
                Ok(b)
            }
        }
    }

    /// `Σ c_i · X^i` on the power basis, at the level and scale of `step`.
    pub fn evaluate_baby_step<G: CoefficientGetter>(
        &self,
        step: &BabyStep,
        pb: &PowerBasis<E::Ciphertext>,
        getter: &mut G,
    ) -> EvalResult<E::Ciphertext> {
        let polys = &step.polynomials;
        let (odd, even) = (polys.is_odd(), polys.is_even());
        let degree = polys.degree();

        let ct_degree = (1..=degree)
            .filter_map(|i| pb.value.get(&i))
            .map(|x| x.degree())
            .max()
            .unwrap_or(1);
        let mut res = self.eval.new_ciphertext(ct_degree, step.level, step.scale);

        match polys.mapping {
            None => {
                let p = &polys.value[0];
                if keeps_degree(0, odd, even) {
                    let c = getter.single(p, 0);
                    if !is_negligible(c) {
                        self.eval.add_assign(&mut res, Operand::Scalar(c))?;
                    }
                }
                for k in (1..=degree).rev() {
                    if !keeps_degree(k, odd, even) {
                        continue;
                    }
                    let c = getter.single(p, k);
                    if !is_negligible(c) {
                        self.eval.mul_then_add(pb.get(k)?, Operand::Scalar(c), &mut res)?;
                    }
                }
            }
            Some(_) => {
                if keeps_degree(0, odd, even) {
                    let values = getter.vector(polys, 0);
                    if !values.iter().all(|&c| is_negligible(c)) {
                        self.eval.add_assign(&mut res, Operand::Vector(&values))?;
                    }
                }
                for k in (1..=degree).rev() {
                    if !keeps_degree(k, odd, even) {
                        continue;
                    }
                    let values = getter.vector(polys, k);
                    if !values.iter().all(|&c| is_negligible(c)) {
                        self.eval
                            .mul_then_add(pb.get(k)?, Operand::Vector(&values), &mut res)?;
                    }
                }
            }
        }
        Ok(res)
    }

    /// `b ← a + b · xpow`, rescaling `b` first.
    ///
    /// # Panics
    ///
    /// Panics if the scales of `a` and `b · xpow` disagree, which means the
    /// simulated targets and the real evaluation diverged.
    pub fn evaluate_monomial(
        &self,
        a: &E::Ciphertext,
        b: &mut E::Ciphertext,
        xpow: &E::Ciphertext,
    ) -> EvalResult<()> {
        if b.degree() == 2 {
            self.eval.relinearize(b)?;
        }
        self.eval.rescale(b)?;
        self.eval.mul_assign(b, Operand::Ciphertext(xpow))?;
        if !a.scale().in_delta(b.scale(), SCALE_TOLERANCE_BITS) {
            panic!("scale discrepancy: {} != {}", a.scale(), b.scale());
        }
        self.eval.add_assign(b, Operand::Ciphertext(a))
    }

    /// Maps the interval of a Chebyshev polynomial onto `[-1, 1]`, consuming
    /// one rescale. Returns a copy of `ct` when the map is the identity.
    pub fn change_of_basis(
        &self,
        ct: &E::Ciphertext,
        poly: &Polynomial,
    ) -> EvalResult<E::Ciphertext> {
        let (scalar, constant) = poly.change_of_basis();
        if scalar == 1.0 && constant == 0.0 {
            return Ok(ct.clone());
        }
        let mut out = self.eval.mul(ct, Operand::real(scalar))?;
        self.eval.add_assign(&mut out, Operand::real(constant))?;
        self.eval.rescale(&mut out)?;
        Ok(out)
    }
}

fn keeps_degree(k: usize, odd: bool, even: bool) -> bool {
    !(odd || even) || (k & 1 == 0 && even) || (k & 1 == 1 && odd)
}
