//! Scheme-agnostic homomorphic evaluation.
//!
//! Every algorithm in this module is written against a handful of narrow
//! capability traits rather than a concrete scheme. A backend implements
//! [`Arithmetic`] and, when needed, [`Rotation`], [`Encoder`] and
//! [`Hoisting`]; the level/scale simulator implements [`Arithmetic`] too, so
//! power-basis generation is shared between dry runs and real evaluation.
//!
//! Evaluators are not meant to be shared between threads. Each worker takes
//! its own [`Arithmetic::shallow_copy`], which shares read-only parameters
//! and owns fresh scratch space.
pub mod linear_transformation;
pub mod paterson_stockmeyer;
pub mod polynomial_evaluator;
pub mod power_basis;
pub mod simulator;

pub use linear_transformation::{
    Diagonals, GiantStep, LinearTransformation, LinearTransformationEvaluator,
    LinearTransformationParameters,
};
pub use paterson_stockmeyer::{BabyStep, PatersonStockmeyerPolynomial, PsNode, optimal_split};
pub use polynomial_evaluator::{CoefficientGetter, PolynomialEvaluator, SlotCoefficientGetter};
pub use power_basis::{PowerBasis, split_degree};
pub use simulator::{SimEvaluator, SimOperand};

use crate::errors::{EvalError, EvalResult};
use crate::params::Parameters;
use crate::scale::Scale;
use num_complex::Complex64;

/// Level, degree and scale bookkeeping shared by real ciphertexts and
/// simulated operands.
pub trait Element: Clone {
    /// Index of the last modulus still present.
    fn level(&self) -> usize;
    /// 1 for a linear ciphertext, 2 after a multiplication without relinearization.
    fn degree(&self) -> usize;
    fn scale(&self) -> Scale;
    /// Relabels the scale without touching the encrypted data. The decoded
    /// value is divided by `scale / old_scale`.
    fn set_scale(&mut self, scale: Scale);
}

/// Second operand of `add`, `sub`, `mul` and `mul_then_add`.
#[derive(Debug)]
pub enum Operand<'a, C> {
    Ciphertext(&'a C),
    Scalar(Complex64),
    /// One value per slot; shorter vectors are zero padded.
    Vector(&'a [Complex64]),
}

// derived impls would require `C: Copy`
impl<C> Clone for Operand<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Operand<'_, C> {}

impl<'a, C> Operand<'a, C> {
    pub fn real(value: f64) -> Self {
        Operand::Scalar(Complex64::new(value, 0.0))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operand::Ciphertext(_) => "ciphertext",
            Operand::Scalar(_) => "scalar",
            Operand::Vector(_) => "vector",
        }
    }

    pub fn as_ciphertext(&self, operation: &'static str) -> EvalResult<&'a C> {
        match *self {
            Operand::Ciphertext(ct) => Ok(ct),
            _ => Err(EvalError::UnsupportedOperand {
                operation,
                accepted: "ciphertext",
            }),
        }
    }
}

impl<'a, C> From<&'a C> for Operand<'a, C> {
    fn from(ct: &'a C) -> Self {
        Operand::Ciphertext(ct)
    }
}

/// Leveled arithmetic of an approximate homomorphic scheme.
///
/// Scale rules every implementation must follow:
/// - ciphertext additions align scales with [`crate::scale::match_scales`];
/// - constants and vectors are added at the ciphertext scale;
/// - multiplying by a constant or vector encodes it at
///   [`Parameters::rescale_factor`] of the ciphertext level, so one rescale
///   restores the input scale;
/// - `rescale` divides by [`Parameters::rescale_factor`] and drops
///   `levels_consumed_per_rescaling` levels.
pub trait Arithmetic {
    type Ciphertext: Element;

    fn parameters(&self) -> &Parameters;

    fn levels_consumed_per_rescaling(&self) -> usize {
        self.parameters().levels_consumed_per_rescaling()
    }

    /// Copy sharing read-only data with `self` and owning its own buffers.
    fn shallow_copy(&self) -> Self
    where
        Self: Sized;

    /// Encryption of zero with the given metadata.
    fn new_ciphertext(&self, degree: usize, level: usize, scale: Scale) -> Self::Ciphertext;

    fn add(
        &self,
        op0: &Self::Ciphertext,
        op1: Operand<'_, Self::Ciphertext>,
    ) -> EvalResult<Self::Ciphertext>;

    fn sub(
        &self,
        op0: &Self::Ciphertext,
        op1: Operand<'_, Self::Ciphertext>,
    ) -> EvalResult<Self::Ciphertext>;

    /// Product without relinearization.
    fn mul(
        &self,
        op0: &Self::Ciphertext,
        op1: Operand<'_, Self::Ciphertext>,
    ) -> EvalResult<Self::Ciphertext>;

    /// `out += op0 * op1`.
    ///
    /// For constant and vector operands the precondition
    /// `op0.scale <= out.scale` holds: equal scales multiply `out` by the
    /// rescale factor first, a larger `out` scale encodes the operand at the
    /// ratio, and a larger `op0` scale is rejected with
    /// [`EvalError::ScalePrecondition`].
    fn mul_then_add(
        &self,
        op0: &Self::Ciphertext,
        op1: Operand<'_, Self::Ciphertext>,
        out: &mut Self::Ciphertext,
    ) -> EvalResult<()>;

    fn relinearize(&self, ct: &mut Self::Ciphertext) -> EvalResult<()>;

    fn rescale(&self, ct: &mut Self::Ciphertext) -> EvalResult<()>;

    fn drop_level(&self, ct: &mut Self::Ciphertext, levels: usize) -> EvalResult<()>;

    fn neg(&self, ct: &Self::Ciphertext) -> Self::Ciphertext;

    fn mul_relin(
        &self,
        op0: &Self::Ciphertext,
        op1: Operand<'_, Self::Ciphertext>,
    ) -> EvalResult<Self::Ciphertext> {
        let mut out = self.mul(op0, op1)?;
        if out.degree() > 1 {
            self.relinearize(&mut out)?;
        }
        Ok(out)
    }

    fn add_assign(
        &self,
        op0: &mut Self::Ciphertext,
        op1: Operand<'_, Self::Ciphertext>,
    ) -> EvalResult<()> {
        *op0 = self.add(op0, op1)?;
        Ok(())
    }

    fn sub_assign(
        &self,
        op0: &mut Self::Ciphertext,
        op1: Operand<'_, Self::Ciphertext>,
    ) -> EvalResult<()> {
        *op0 = self.sub(op0, op1)?;
        Ok(())
    }

    fn mul_assign(
        &self,
        op0: &mut Self::Ciphertext,
        op1: Operand<'_, Self::Ciphertext>,
    ) -> EvalResult<()> {
        *op0 = self.mul(op0, op1)?;
        Ok(())
    }

    /// Drops `ct` to `level` if it sits above it.
    fn drop_to_level(&self, ct: &mut Self::Ciphertext, level: usize) -> EvalResult<()> {
        if ct.level() > level {
            self.drop_level(ct, ct.level() - level)?;
        }
        Ok(())
    }
}

/// Slot rotations and complex conjugation.
pub trait Rotation: Arithmetic {
    /// Cyclic left rotation: slot `i` of the output holds slot `i + k` of the input.
    fn rotate(&self, ct: &Self::Ciphertext, k: isize) -> EvalResult<Self::Ciphertext>;

    /// Fails with [`EvalError::UnsupportedRing`] in the conjugate-invariant ring.
    fn conjugate(&self, ct: &Self::Ciphertext) -> EvalResult<Self::Ciphertext>;
}

/// Embeds plaintext vectors in the ring representation.
pub trait Encoder {
    type Plaintext: Clone;

    fn encode(&self, values: &[Complex64], level: usize, scale: Scale)
    -> EvalResult<Self::Plaintext>;
}

/// Hoisted key-switching over the extended `QP` modulus.
///
/// A ciphertext is decomposed once and rotated many times; products with
/// plaintexts are accumulated in `QP` without modular reduction until the
/// accumulator reaches its overflow margin.
pub trait Hoisting: Rotation + Encoder {
    /// Gadget decomposition of a ciphertext, reused across rotations.
    type Decomposed;
    /// Degree-1 ciphertext over `QP`, possibly with unreduced coefficients.
    type Extended;

    fn decompose(&self, ct: &Self::Ciphertext, level_p: usize) -> EvalResult<Self::Decomposed>;

    fn new_extended(&self, level_q: usize, level_p: usize) -> Self::Extended;

    /// `ct` multiplied by `P`, the zero-rotation term of a hoisted sum.
    fn lift(&self, ct: &Self::Ciphertext, level_p: usize) -> EvalResult<Self::Extended>;

    /// Rotation of `ct` by `k` left in `QP` (no division by `P`).
    fn rotate_hoisted_lazy(
        &self,
        ct: &Self::Ciphertext,
        decomposed: &Self::Decomposed,
        k: isize,
    ) -> EvalResult<Self::Extended>;

    /// `acc += op * pt` without modular reduction.
    fn mul_plaintext_then_add_lazy(
        &self,
        op: &Self::Extended,
        pt: &Self::Plaintext,
        acc: &mut Self::Extended,
    ) -> EvalResult<()>;

    fn reduce_q(&self, acc: &mut Self::Extended);

    fn reduce_p(&self, acc: &mut Self::Extended);

    /// `acc += rotate(op, k)`, key-switching `op` from `QP`.
    fn rotate_extended_then_add(
        &self,
        op: &Self::Extended,
        k: isize,
        acc: &mut Self::Extended,
    ) -> EvalResult<()>;

    /// Divides by `P` and returns a `Q` ciphertext labelled with `scale`.
    fn mod_down(&self, acc: Self::Extended, scale: Scale) -> EvalResult<Self::Ciphertext>;
}

/// Refreshes the level of a ciphertext.
pub trait Bootstrapper<C> {
    fn bootstrap(&self, ct: &C) -> EvalResult<C>;

    /// Bootstraps ciphertexts that are tracked jointly.
    fn bootstrap_many(&self, cts: &[C]) -> EvalResult<Vec<C>> {
        cts.iter().map(|ct| self.bootstrap(ct)).collect()
    }

    /// Lowest level accepted by [`Bootstrapper::bootstrap`].
    fn minimum_input_level(&self) -> usize;

    /// Level of a freshly bootstrapped ciphertext.
    fn output_level(&self) -> usize;
}
