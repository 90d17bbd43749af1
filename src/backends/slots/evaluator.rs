use super::{NoiseModel, NoiseSource, SlotCiphertext, SlotPlaintext, encode_slots, scale_up};
use crate::errors::{EvalError, EvalResult};
use crate::he::{Arithmetic, Encoder, Hoisting, Operand, Rotation};
use crate::params::{Parameters, RingType};
use crate::scale::{Scale, match_scales};
use num_complex::Complex64;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::trace;

/// Number of operations performed by one evaluator copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounters {
    pub additions: usize,
    pub multiplications: usize,
    pub scalar_multiplications: usize,
    pub relinearizations: usize,
    pub rescales: usize,
    pub rotations: usize,
    pub hoisted_rotations: usize,
    pub decompositions: usize,
    pub lazy_accumulations: usize,
    /// Largest number of unreduced accumulations seen in a `Q` accumulator.
    pub max_pending_q: usize,
    /// Largest number of unreduced accumulations seen in a `P` accumulator.
    pub max_pending_p: usize,
    /// Accumulations performed beyond the overflow margin.
    pub overflows: usize,
}

impl OperationCounters {
    /// Operations that transform ciphertexts (everything but bookkeeping).
    pub fn ring_operations(&self) -> usize {
        self.additions
            + self.multiplications
            + self.scalar_multiplications
            + self.relinearizations
            + self.rescales
            + self.rotations
            + self.hoisted_rotations
    }
}

/// Hoisted decomposition of a ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDecomposition {
    level_q: usize,
    level_p: usize,
}

/// Accumulator over `QP`, values multiplied by `P`.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotExtended {
    values: Vec<Complex64>,
    level_q: usize,
    level_p: usize,
    pending_q: usize,
    pending_p: usize,
}

/// Evaluator of the slot backend.
///
/// Counters and the noise generator live in `Cell`s, so the type is not
/// `Sync`; take a [`SlotEvaluator::shallow_copy`] per thread.
#[derive(Debug)]
pub struct SlotEvaluator {
    params: Arc<Parameters>,
    noise: NoiseSource,
    model: NoiseModel,
    /// Rotation amounts (mod the slot count) with a key; `None` means all.
    rotation_keys: Option<Arc<BTreeSet<usize>>>,
    counters: Cell<OperationCounters>,
}

impl SlotEvaluator {
    pub fn new(params: Arc<Parameters>, seed: u64) -> Self {
        let model = NoiseModel::for_parameters(&params);
        Self {
            params,
            noise: NoiseSource::new(seed),
            model,
            rotation_keys: None,
            counters: Cell::new(OperationCounters::default()),
        }
    }

    pub fn with_noise(mut self, model: NoiseModel) -> Self {
        self.model = model;
        self
    }

    /// Restricts rotations to the given amounts, as if only those Galois
    /// keys had been generated.
    pub fn with_rotation_keys(mut self, rotations: &[isize]) -> Self {
        let slots = self.params.max_slots();
        let keys = rotations
            .iter()
            .map(|&k| k.rem_euclid(slots as isize) as usize)
            .collect();
        self.rotation_keys = Some(Arc::new(keys));
        self
    }

    pub fn counters(&self) -> OperationCounters {
        self.counters.get()
    }

    pub fn reset_counters(&self) {
        self.counters.set(OperationCounters::default());
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounters)) {
        let mut counters = self.counters.get();
        f(&mut counters);
        self.counters.set(counters);
    }

    fn ring(&self) -> RingType {
        self.params.ring_type()
    }

    fn slots(&self) -> usize {
        self.params.max_slots()
    }

    fn check_rotation(&self, k: isize) -> EvalResult<usize> {
        let slots = self.slots();
        let k = k.rem_euclid(slots as isize) as usize;
        if let Some(keys) = &self.rotation_keys {
            if k != 0 && !keys.contains(&k) {
                return Err(EvalError::invalid(format!(
                    "rotation key for {k} was not generated"
                )));
            }
        }
        Ok(k)
    }

    fn p_factor(&self, level_p: usize) -> f64 {
        self.params.p()[..=level_p]
            .iter()
            .map(|&p| p as f64)
            .product()
    }

    fn encode_operand(&self, values: &[Complex64], scale: f64) -> EvalResult<Vec<Complex64>> {
        encode_slots(&self.params, values, scale).ok_or_else(|| {
            EvalError::invalid(format!(
                "{} values do not fit in {} slots",
                values.len(),
                self.slots()
            ))
        })
    }

    /// `op0 ± op1` with scales matched by integer factors.
    fn add_or_sub(
        &self,
        op0: &SlotCiphertext,
        op1: Operand<'_, SlotCiphertext>,
        sign: f64,
    ) -> EvalResult<SlotCiphertext> {
        self.count(|c| c.additions += 1);
        let mut out = op0.clone();
        match op1 {
            Operand::Ciphertext(op1) => {
                let (r0, r1) = match_scales(op0.scale, op1.scale);
                let (r0, r1) = (r0 as f64, r1 as f64);
                for (o, &b) in out.values.iter_mut().zip(&op1.values) {
                    *o = *o * r0 + b * (sign * r1);
                }
                out.scale = (op0.scale * r0).max(op1.scale * r1);
                out.level = op0.level.min(op1.level);
                out.degree = op0.degree.max(op1.degree);
            }
            Operand::Scalar(c) => {
                let c = scale_up(c * sign, op0.scale.value());
                for o in out.values.iter_mut() {
                    *o += c;
                }
            }
            Operand::Vector(values) => {
                let encoded = self.encode_operand(values, op0.scale.value())?;
                for (o, e) in out.values.iter_mut().zip(encoded) {
                    *o += e * sign;
                }
            }
        }
        Ok(out)
    }

    fn scalar_factor(&self, op0: &SlotCiphertext, out: &mut SlotCiphertext) -> EvalResult<f64> {
        let level = op0.level.min(out.level);
        out.level = level;
        if op0.scale == out.scale {
            let q = self.params.rescale_factor(level);
            for o in out.values.iter_mut() {
                *o *= q;
            }
            out.scale = out.scale * q;
        } else if op0.scale > out.scale {
            return Err(EvalError::ScalePrecondition {
                operation: "mul_then_add",
                op_scale: op0.scale.value(),
                out_scale: out.scale.value(),
            });
        }
        Ok((out.scale / op0.scale).value())
    }
}

impl Arithmetic for SlotEvaluator {
    type Ciphertext = SlotCiphertext;

    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn shallow_copy(&self) -> Self {
        Self {
            params: Arc::clone(&self.params),
            noise: self.noise.fork(),
            model: self.model,
            rotation_keys: self.rotation_keys.clone(),
            counters: Cell::new(OperationCounters::default()),
        }
    }

    fn new_ciphertext(&self, degree: usize, level: usize, scale: Scale) -> SlotCiphertext {
        SlotCiphertext {
            values: vec![Complex64::new(0.0, 0.0); self.slots()],
            level,
            degree,
            scale,
        }
    }

    fn add(
        &self,
        op0: &SlotCiphertext,
        op1: Operand<'_, SlotCiphertext>,
    ) -> EvalResult<SlotCiphertext> {
        self.add_or_sub(op0, op1, 1.0)
    }

    fn sub(
        &self,
        op0: &SlotCiphertext,
        op1: Operand<'_, SlotCiphertext>,
    ) -> EvalResult<SlotCiphertext> {
        self.add_or_sub(op0, op1, -1.0)
    }

    fn mul(
        &self,
        op0: &SlotCiphertext,
        op1: Operand<'_, SlotCiphertext>,
    ) -> EvalResult<SlotCiphertext> {
        let mut out = op0.clone();
        match op1 {
            Operand::Ciphertext(op1) => {
                let degree = op0.degree + op1.degree;
                if degree > 2 {
                    return Err(EvalError::invalid(format!(
                        "product of degree {degree} ciphertexts is not supported"
                    )));
                }
                self.count(|c| c.multiplications += 1);
                for (o, &b) in out.values.iter_mut().zip(&op1.values) {
                    *o *= b;
                }
                out.level = op0.level.min(op1.level);
                out.degree = degree;
                out.scale = op0.scale * op1.scale;
            }
            Operand::Scalar(c) => {
                self.count(|c| c.scalar_multiplications += 1);
                let q = self.params.rescale_factor(op0.level);
                let c = scale_up(c, q);
                for o in out.values.iter_mut() {
                    *o *= c;
                }
                out.scale = op0.scale * q;
            }
            Operand::Vector(values) => {
                self.count(|c| c.scalar_multiplications += 1);
                let q = self.params.rescale_factor(op0.level);
                let encoded = self.encode_operand(values, q)?;
                for (o, e) in out.values.iter_mut().zip(encoded) {
                    *o *= e;
                }
                out.scale = op0.scale * q;
            }
        }
        Ok(out)
    }

    fn mul_then_add(
        &self,
        op0: &SlotCiphertext,
        op1: Operand<'_, SlotCiphertext>,
        out: &mut SlotCiphertext,
    ) -> EvalResult<()> {
        match op1 {
            Operand::Ciphertext(_) => {
                let product = self.mul(op0, op1)?;
                *out = self.add(out, Operand::Ciphertext(&product))?;
            }
            Operand::Scalar(c) => {
                let ratio = self.scalar_factor(op0, out)?;
                self.count(|c| c.scalar_multiplications += 1);
                let c = scale_up(c, ratio);
                for (o, &a) in out.values.iter_mut().zip(&op0.values) {
                    *o += a * c;
                }
                out.degree = out.degree.max(op0.degree);
            }
            Operand::Vector(values) => {
                let ratio = self.scalar_factor(op0, out)?;
                self.count(|c| c.scalar_multiplications += 1);
                let encoded = self.encode_operand(values, ratio)?;
                for ((o, &a), e) in out.values.iter_mut().zip(&op0.values).zip(encoded) {
                    *o += a * e;
                }
                out.degree = out.degree.max(op0.degree);
            }
        }
        Ok(())
    }

    fn relinearize(&self, ct: &mut SlotCiphertext) -> EvalResult<()> {
        match ct.degree {
            0 | 1 => Ok(()),
            2 => {
                self.count(|c| c.relinearizations += 1);
                self.noise
                    .add(&mut ct.values, self.model.key_switch, self.ring());
                ct.degree = 1;
                Ok(())
            }
            d => Err(EvalError::invalid(format!(
                "cannot relinearize a degree {d} ciphertext"
            ))),
        }
    }

    fn rescale(&self, ct: &mut SlotCiphertext) -> EvalResult<()> {
        let lcr = self.levels_consumed_per_rescaling();
        if ct.level < lcr {
            return Err(EvalError::InsufficientLevel {
                operation: "rescale",
                level: ct.level,
                required: lcr,
            });
        }
        self.count(|c| c.rescales += 1);
        let q = self.params.rescale_factor(ct.level);
        for v in ct.values.iter_mut() {
            *v /= q;
        }
        self.noise
            .add(&mut ct.values, self.model.rounding, self.ring());
        ct.scale = ct.scale / q;
        ct.level -= lcr;
        Ok(())
    }

    fn drop_level(&self, ct: &mut SlotCiphertext, levels: usize) -> EvalResult<()> {
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

    fn neg(&self, ct: &SlotCiphertext) -> SlotCiphertext {
        let mut out = ct.clone();
        for v in out.values.iter_mut() {
            *v = -*v;
        }
        out
    }
}

impl Rotation for SlotEvaluator {
    fn rotate(&self, ct: &SlotCiphertext, k: isize) -> EvalResult<SlotCiphertext> {
        let k = self.check_rotation(k)?;
        if k == 0 {
            return Ok(ct.clone());
        }
        self.count(|c| c.rotations += 1);
        let mut out = ct.clone();
        out.values.rotate_left(k);
        self.noise
            .add(&mut out.values, self.model.key_switch, self.ring());
        Ok(out)
    }

    fn conjugate(&self, ct: &SlotCiphertext) -> EvalResult<SlotCiphertext> {
        if self.ring() == RingType::ConjugateInvariant {
            return Err(EvalError::UnsupportedRing {
                operation: "conjugate",
                ring: self.ring().name(),
            });
        }
        self.count(|c| c.rotations += 1);
        let mut out = ct.clone();
        for v in out.values.iter_mut() {
            *v = v.conj();
        }
        self.noise
            .add(&mut out.values, self.model.key_switch, self.ring());
        Ok(out)
    }
}

impl Encoder for SlotEvaluator {
    type Plaintext = SlotPlaintext;

    fn encode(&self, values: &[Complex64], level: usize, scale: Scale) -> EvalResult<SlotPlaintext> {
        Ok(SlotPlaintext {
            values: self.encode_operand(values, scale.value())?,
            level,
            scale,
        })
    }
}

impl Hoisting for SlotEvaluator {
    type Decomposed = SlotDecomposition;
    type Extended = SlotExtended;

    fn decompose(&self, ct: &SlotCiphertext, level_p: usize) -> EvalResult<SlotDecomposition> {
        if level_p > self.params.max_level_p() {
            return Err(EvalError::invalid(format!(
                "level_p {level_p} above the maximum {}",
                self.params.max_level_p()
            )));
        }
        self.count(|c| c.decompositions += 1);
        Ok(SlotDecomposition {
            level_q: ct.level,
            level_p,
        })
    }

    fn new_extended(&self, level_q: usize, level_p: usize) -> SlotExtended {
        SlotExtended {
            values: vec![Complex64::new(0.0, 0.0); self.slots()],
            level_q,
            level_p,
            pending_q: 0,
            pending_p: 0,
        }
    }

    fn lift(&self, ct: &SlotCiphertext, level_p: usize) -> EvalResult<SlotExtended> {
        let p = self.p_factor(level_p);
        Ok(SlotExtended {
            values: ct.values.iter().map(|v| v * p).collect(),
            level_q: ct.level,
            level_p,
            pending_q: 0,
            pending_p: 0,
        })
    }

    fn rotate_hoisted_lazy(
        &self,
        ct: &SlotCiphertext,
        decomposed: &SlotDecomposition,
        k: isize,
    ) -> EvalResult<SlotExtended> {
        let k = self.check_rotation(k)?;
        let mut out = self.lift(ct, decomposed.level_p)?;
        out.level_q = decomposed.level_q.min(ct.level);
        if k != 0 {
            self.count(|c| c.hoisted_rotations += 1);
            out.values.rotate_left(k);
            self.noise
                .add(&mut out.values, self.model.key_switch, self.ring());
        }
        Ok(out)
    }

    fn mul_plaintext_then_add_lazy(
        &self,
        op: &SlotExtended,
        pt: &SlotPlaintext,
        acc: &mut SlotExtended,
    ) -> EvalResult<()> {
        for ((a, &o), &p) in acc.values.iter_mut().zip(&op.values).zip(&pt.values) {
            *a += o * p;
        }
        acc.pending_q += 1;
        acc.pending_p += 1;
        let margin_q = self.params.qi_overflow_margin(acc.level_q);
        let margin_p = self.params.pi_overflow_margin(acc.level_p);
        let (pending_q, pending_p) = (acc.pending_q, acc.pending_p);
        self.count(|c| {
            c.lazy_accumulations += 1;
            c.max_pending_q = c.max_pending_q.max(pending_q);
            c.max_pending_p = c.max_pending_p.max(pending_p);
            if pending_q > margin_q || pending_p > margin_p {
                c.overflows += 1;
            }
        });
        Ok(())
    }

    fn reduce_q(&self, acc: &mut SlotExtended) {
        acc.pending_q = 0;
    }

    fn reduce_p(&self, acc: &mut SlotExtended) {
        acc.pending_p = 0;
    }

    fn rotate_extended_then_add(
        &self,
        op: &SlotExtended,
        k: isize,
        acc: &mut SlotExtended,
    ) -> EvalResult<()> {
        let k = self.check_rotation(k)?;
        let mut rotated = op.values.clone();
        if k != 0 {
            self.count(|c| c.rotations += 1);
            rotated.rotate_left(k);
            self.noise
                .add(&mut rotated, self.model.key_switch, self.ring());
        }
        for (a, r) in acc.values.iter_mut().zip(rotated) {
            *a += r;
        }
        trace!(k, "giant-step rotation accumulated");
        Ok(())
    }

    fn mod_down(&self, acc: SlotExtended, scale: Scale) -> EvalResult<SlotCiphertext> {
        let p = self.p_factor(acc.level_p);
        let mut values: Vec<Complex64> = acc.values.iter().map(|v| v / p).collect();
        self.noise.add(&mut values, self.model.rounding, self.ring());
        Ok(SlotCiphertext {
            values,
            level: acc.level_q,
            degree: 1,
            scale,
        })
    }
}
