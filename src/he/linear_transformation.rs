//! Plaintext matrix × encrypted vector products in the diagonal representation.
//!
//! A matrix `M` of dimension `n` (the slot count) is stored by its non-zero
//! generalised diagonals `d_k[s] = M[s][(s + k) mod n]`, so that
//! `M · v = Σ_k d_k ⊙ rot_k(v)`.
//!
//! The naive strategy performs one hoisted rotation per diagonal. The
//! baby-step giant-step strategy writes `k = j + i` with `j` a multiple of
//! `N1` and `i < N1`, so that only the distinct `i` (baby) and `j` (giant)
//! rotations are needed:
//! `M · v = Σ_j rot_j( Σ_i rot_{-j}(d_{j+i}) ⊙ rot_i(v) )`.
use super::{Element, Encoder, Hoisting};
use crate::errors::{EvalError, EvalResult};
use crate::scale::Scale;
use num_complex::Complex64;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Strategy of a linear transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GiantStep {
    /// Baby-step giant-step with the step chosen by [`optimal_giant_step`].
    #[default]
    Auto,
    /// One rotation per diagonal.
    Naive,
    /// Baby-step giant-step with the given power-of-two giant step `N1`.
    Explicit(usize),
}

impl GiantStep {
    /// Decodes the integer convention `-1` naive, `0` automatic, `> 0` explicit.
    pub fn from_raw(raw: isize) -> EvalResult<Self> {
        match raw {
            -1 => Ok(GiantStep::Naive),
            0 => Ok(GiantStep::Auto),
            n if n > 0 => Ok(GiantStep::Explicit(n as usize)),
            n => Err(EvalError::invalid(format!("invalid giant step {n}"))),
        }
    }
}

/// Non-zero diagonals of a square matrix, indices reduced modulo the dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagonals {
    slots: usize,
    value: BTreeMap<usize, Vec<Complex64>>,
}

impl Diagonals {
    pub fn new(
        slots: usize,
        entries: impl IntoIterator<Item = (isize, Vec<Complex64>)>,
    ) -> EvalResult<Self> {
        if !slots.is_power_of_two() {
            return Err(EvalError::invalid(format!(
                "matrix dimension {slots} is not a power of two"
            )));
        }
        let mut value = BTreeMap::new();
        for (k, diagonal) in entries {
            if diagonal.len() != slots {
                return Err(EvalError::invalid(format!(
                    "diagonal {k} has {} entries, expected {slots}",
                    diagonal.len()
                )));
            }
            let reduced = k.rem_euclid(slots as isize) as usize;
            if value.insert(reduced, diagonal).is_some() {
                return Err(EvalError::invalid(format!(
                    "diagonal {k} given twice (index {reduced} mod {slots})"
                )));
            }
        }
        if value.is_empty() {
            return Err(EvalError::invalid("linear transformation has no diagonals"));
        }
        Ok(Self { slots, value })
    }

    /// Extracts the non-zero diagonals of a dense row-major matrix.
    pub fn from_dense(matrix: &[Vec<Complex64>]) -> EvalResult<Self> {
        let n = matrix.len();
        if matrix.iter().any(|row| row.len() != n) {
            return Err(EvalError::invalid("matrix is not square"));
        }
        let entries = (0..n).filter_map(|k| {
            let diagonal: Vec<Complex64> = (0..n).map(|s| matrix[s][(s + k) % n]).collect();
            diagonal
                .iter()
                .any(|c| c.norm_sqr() > 0.0)
                .then_some((k as isize, diagonal))
        });
        Self::new(n, entries)
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn indices(&self) -> Vec<usize> {
        self.value.keys().copied().collect()
    }

    pub fn get(&self, k: usize) -> Option<&[Complex64]> {
        self.value.get(&k).map(Vec::as_slice)
    }

    /// Cleartext `M · v`.
    pub fn evaluate_plain(&self, v: &[Complex64]) -> Vec<Complex64> {
        let n = self.slots;
        let mut out = vec![Complex64::new(0.0, 0.0); n];
        for (&k, diagonal) in &self.value {
            for (s, o) in out.iter_mut().enumerate() {
                *o += diagonal[s] * v[(s + k) % n];
            }
        }
        out
    }
}

/// Buckets the diagonal indices for a giant step `n1`.
///
/// Returns the map giant `j` → sorted babies `i` with `j + i = k`, then the
/// sorted giant and baby rotation amounts.
pub fn bsgs_index(
    indices: &[usize],
    slots: usize,
    n1: usize,
) -> (BTreeMap<usize, Vec<usize>>, Vec<usize>, Vec<usize>) {
    let mut index: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut babies = Vec::new();
    for &k in indices {
        let k = k & (slots - 1);
        let giant = ((k / n1) * n1) & (slots - 1);
        let baby = k & (n1 - 1);
        index.entry(giant).or_default().push(baby);
        babies.push(baby);
    }
    for list in index.values_mut() {
        list.sort_unstable();
        list.dedup();
    }
    babies.sort_unstable();
    babies.dedup();
    let giants = index.keys().copied().collect();
    (index, giants, babies)
}

/// Power-of-two giant step minimising `N1 + N2 + |N1 - N2|`, where `N1` and
/// `N2` count the non-trivial giant and baby rotations.
pub fn optimal_giant_step(indices: &[usize], slots: usize) -> usize {
    let mut best = (usize::MAX, 1);
    let mut n1 = 1;
    while n1 < slots {
        let (_, giants, babies) = bsgs_index(indices, slots, n1);
        let nb1 = giants.iter().filter(|&&j| j != 0).count();
        let nb2 = babies.iter().filter(|&&i| i != 0).count();
        let cost = nb1 + nb2 + nb1.abs_diff(nb2);
        if cost < best.0 {
            best = (cost, n1);
        }
        n1 <<= 1;
    }
    best.1
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearTransformationParameters {
    /// Level the plaintext diagonals are encoded at.
    pub level_q: usize,
    /// Auxiliary moduli used by the hoisted key-switching.
    pub level_p: usize,
    /// Scale of the encoded diagonals. Choosing the modulus at `level_q`
    /// lets a rescale restore the input scale.
    pub scale: Scale,
    pub giant_step: GiantStep,
}

/// Encoded diagonals, keyed by diagonal index. In baby-step giant-step mode
/// the diagonal `j + i` is stored pre-rotated by `-j`.
#[derive(Debug, Clone)]
pub struct LinearTransformation<P> {
    pub level_q: usize,
    pub level_p: usize,
    pub scale: Scale,
    slots: usize,
    /// `None` for the naive strategy.
    n1: Option<usize>,
    vec: BTreeMap<usize, P>,
}

impl<P: Clone> LinearTransformation<P> {
    pub fn new<E>(
        encoder: &E,
        params: &LinearTransformationParameters,
        diagonals: &Diagonals,
    ) -> EvalResult<Self>
    where
        E: Encoder<Plaintext = P>,
    {
        let slots = diagonals.slots();
        let indices = diagonals.indices();
        let n1 = match params.giant_step {
            GiantStep::Naive => None,
            GiantStep::Auto => Some(optimal_giant_step(&indices, slots)),
            GiantStep::Explicit(n1) => {
                if !n1.is_power_of_two() || n1 > slots {
                    return Err(EvalError::invalid(format!(
                        "giant step {n1} must be a power of two no larger than {slots}"
                    )));
                }
                Some(n1)
            }
        };

        let mut vec = BTreeMap::new();
        match n1 {
            None => {
                for (&k, diagonal) in &diagonals.value {
                    vec.insert(k, encoder.encode(diagonal, params.level_q, params.scale)?);
                }
            }
            Some(n1) => {
                let (index, _, _) = bsgs_index(&indices, slots, n1);
                for (&j, babies) in &index {
                    for &i in babies {
                        let mut diagonal = diagonals.value[&(j + i)].clone();
                        diagonal.rotate_right(j);
                        vec.insert(j + i, encoder.encode(&diagonal, params.level_q, params.scale)?);
                    }
                }
            }
        }

        Ok(Self {
            level_q: params.level_q,
            level_p: params.level_p,
            scale: params.scale,
            slots,
            n1,
            vec,
        })
    }

    pub fn indices(&self) -> Vec<usize> {
        self.vec.keys().copied().collect()
    }

    /// Giant step `N1`, `None` for the naive strategy.
    pub fn giant_step(&self) -> Option<usize> {
        self.n1
    }

    /// Rotation amounts for which keys must exist.
    pub fn rotations(&self) -> Vec<isize> {
        let mut rotations: Vec<usize> = match self.n1 {
            None => self.indices(),
            Some(n1) => {
                let (_, giants, babies) = bsgs_index(&self.indices(), self.slots, n1);
                giants.into_iter().chain(babies).collect()
            }
        };
        rotations.retain(|&k| k != 0);
        rotations.sort_unstable();
        rotations.dedup();
        rotations.into_iter().map(|k| k as isize).collect()
    }
}

/// Evaluates [`LinearTransformation`]s with hoisted rotations.
#[derive(Debug)]
pub struct LinearTransformationEvaluator<E> {
    eval: E,
}

impl<E> LinearTransformationEvaluator<E>
where
    E: Hoisting,
{
    pub fn new(eval: E) -> Self {
        Self { eval }
    }

    pub fn evaluator(&self) -> &E {
        &self.eval
    }

    pub fn shallow_copy(&self) -> Self {
        Self {
            eval: self.eval.shallow_copy(),
        }
    }

    /// `M · ct` at scale `ct.scale · lt.scale`, not rescaled.
    pub fn evaluate(
        &self,
        ct: &E::Ciphertext,
        lt: &LinearTransformation<E::Plaintext>,
    ) -> EvalResult<E::Ciphertext> {
        let mut out = self.evaluate_many(ct, &[lt])?;
        out.pop()
            .ok_or_else(|| EvalError::invalid("no linear transformation given"))
    }

    /// Several transformations of the same input sharing one decomposition.
    #[instrument(skip_all, fields(count = lts.len(), level = ct.level()))]
    pub fn evaluate_many(
        &self,
        ct: &E::Ciphertext,
        lts: &[&LinearTransformation<E::Plaintext>],
    ) -> EvalResult<Vec<E::Ciphertext>> {
        let slots = self.eval.parameters().max_slots();
        if let Some(lt) = lts.iter().find(|lt| lt.slots != slots) {
            return Err(EvalError::invalid(format!(
                "linear transformation of dimension {} on {slots} slots",
                lt.slots
            )));
        }
        let Some(level_q) = lts.iter().map(|lt| lt.level_q).min() else {
            return Ok(Vec::new());
        };
        let level_p = lts.iter().map(|lt| lt.level_p).max().unwrap_or(0);

        let mut input = ct.clone();
        self.eval.drop_to_level(&mut input, level_q)?;
        let decomposed = self.eval.decompose(&input, level_p)?;

        lts.iter()
            .map(|lt| match lt.n1 {
                None => self.naive(&input, &decomposed, lt),
                Some(n1) => self.bsgs(&input, &decomposed, lt, n1),
            })
            .collect()
    }

    /// Applies the transformations one after the other, rescaling after each.
    pub fn evaluate_sequential(
        &self,
        ct: &E::Ciphertext,
        lts: &[&LinearTransformation<E::Plaintext>],
    ) -> EvalResult<E::Ciphertext> {
        let mut out = ct.clone();
        for lt in lts {
            out = self.evaluate(&out, lt)?;
            self.eval.rescale(&mut out)?;
        }
        Ok(out)
    }

    fn naive(
        &self,
        ct: &E::Ciphertext,
        decomposed: &E::Decomposed,
        lt: &LinearTransformation<E::Plaintext>,
    ) -> EvalResult<E::Ciphertext> {
        let params = self.eval.parameters();
        let level_q = ct.level().min(lt.level_q);
        let margin_q = params.qi_overflow_margin(level_q);
        let margin_p = params.pi_overflow_margin(lt.level_p);
        debug!(diagonals = lt.vec.len(), "naive linear transformation");

        let mut acc = self.eval.new_extended(level_q, lt.level_p);
        for (cnt, (&k, pt)) in lt.vec.iter().enumerate() {
            let rotated = if k == 0 {
                self.eval.lift(ct, lt.level_p)?
            } else {
                self.eval.rotate_hoisted_lazy(ct, decomposed, k as isize)?
            };
            self.eval.mul_plaintext_then_add_lazy(&rotated, pt, &mut acc)?;
            if cnt % margin_q == margin_q - 1 {
                self.eval.reduce_q(&mut acc);
            }
            if cnt % margin_p == margin_p - 1 {
                self.eval.reduce_p(&mut acc);
            }
        }
        self.eval.mod_down(acc, ct.scale() * lt.scale)
    }

    fn bsgs(
        &self,
        ct: &E::Ciphertext,
        decomposed: &E::Decomposed,
        lt: &LinearTransformation<E::Plaintext>,
        n1: usize,
    ) -> EvalResult<E::Ciphertext> {
        let params = self.eval.parameters();
        let level_q = ct.level().min(lt.level_q);
        let margin_q = params.qi_overflow_margin(level_q);
        let margin_p = params.pi_overflow_margin(lt.level_p);

        let (index, giants, babies) = bsgs_index(&lt.indices(), lt.slots, n1);
        debug!(
            n1,
            giants = giants.len(),
            babies = babies.len(),
            "baby-step giant-step linear transformation"
        );

        let mut rotated = BTreeMap::new();
        for &i in &babies {
            let ext = if i == 0 {
                self.eval.lift(ct, lt.level_p)?
            } else {
                self.eval.rotate_hoisted_lazy(ct, decomposed, i as isize)?
            };
            rotated.insert(i, ext);
        }

        let mut acc = self.eval.new_extended(level_q, lt.level_p);
        for (&j, group) in &index {
            let mut tmp = self.eval.new_extended(level_q, lt.level_p);
            for (cnt, &i) in group.iter().enumerate() {
                let pt = lt
                    .vec
                    .get(&(j + i))
                    .ok_or_else(|| EvalError::invalid(format!("diagonal {} not encoded", j + i)))?;
                let baby = rotated
                    .get(&i)
                    .ok_or_else(|| EvalError::invalid(format!("baby rotation {i} missing")))?;
                self.eval.mul_plaintext_then_add_lazy(baby, pt, &mut tmp)?;
                if cnt % margin_q == margin_q - 1 {
                    self.eval.reduce_q(&mut tmp);
                }
                if cnt % margin_p == margin_p - 1 {
                    self.eval.reduce_p(&mut tmp);
                }
            }
            self.eval.reduce_q(&mut tmp);
            self.eval.reduce_p(&mut tmp);
            self.eval.rotate_extended_then_add(&tmp, j as isize, &mut acc)?;
        }
        self.eval.mod_down(acc, ct.scale() * lt.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bsgs_buckets_recombine_indices() {
        let slots = 64;
        let indices: Vec<usize> = [-15isize, -4, -1, 0, 1, 2, 3, 4, 15]
            .iter()
            .map(|k| k.rem_euclid(slots as isize) as usize)
            .collect();
        let (index, giants, babies) = bsgs_index(&indices, slots, 8);
        let mut recombined: Vec<usize> = index
            .iter()
            .flat_map(|(&j, bs)| bs.iter().map(move |&i| j + i))
            .collect();
        recombined.sort_unstable();
        let mut expected = indices.clone();
        expected.sort_unstable();
        assert_eq!(recombined, expected);
        assert!(giants.iter().all(|j| j % 8 == 0));
        assert!(babies.iter().all(|&i| i < 8));
    }

    #[test]
    fn optimal_giant_step_balances_rotations() {
        let indices: Vec<usize> = (0..64).collect();
        assert_eq!(optimal_giant_step(&indices, 64), 8);
        assert_eq!(optimal_giant_step(&[0], 64), 1);
    }

    #[test]
    fn giant_step_integer_convention() {
        assert_eq!(GiantStep::from_raw(-1), Ok(GiantStep::Naive));
        assert_eq!(GiantStep::from_raw(0), Ok(GiantStep::Auto));
        assert_eq!(GiantStep::from_raw(16), Ok(GiantStep::Explicit(16)));
        assert!(GiantStep::from_raw(-3).is_err());
    }

    #[test]
    fn diagonals_reduce_negative_indices() {
        let one = vec![Complex64::new(1.0, 0.0); 4];
        let diagonals = Diagonals::new(4, [(-1, one.clone()), (0, one.clone())]).unwrap();
        assert_eq!(diagonals.indices(), vec![0, 3]);
        assert!(Diagonals::new(4, [(-1, one.clone()), (3, one)]).is_err());
    }

    #[test]
    fn plain_evaluation_matches_dense_product() {
        let n = 4;
        let matrix: Vec<Vec<Complex64>> = (0..n)
            .map(|r| {
                (0..n)
                    .map(|c| Complex64::new((r * n + c) as f64, 0.0))
                    .collect()
            })
            .collect();
        let v: Vec<Complex64> = (0..n).map(|i| Complex64::new(i as f64 + 1.0, 0.0)).collect();
        let diagonals = Diagonals::from_dense(&matrix).unwrap();
        let out = diagonals.evaluate_plain(&v);
        for r in 0..n {
            let expected: Complex64 = (0..n).map(|c| matrix[r][c] * v[c]).sum();
            assert!((out[r] - expected).norm() < 1e-12);
        }
    }
}
