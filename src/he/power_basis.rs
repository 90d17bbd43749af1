use super::{Arithmetic, Element, Operand};
use crate::errors::{EvalError, EvalResult};
use crate::polynomial::{Basis, bit_length};
use std::collections::BTreeMap;
use tracing::trace;

/// Powers `X^i` (or `T_i(X)` in the Chebyshev basis) of an encrypted value.
///
/// The map only grows; a power is computed once and reused by every later
/// request, across polynomials evaluated on the same input.
#[derive(Debug, Clone)]
pub struct PowerBasis<C> {
    pub value: BTreeMap<usize, C>,
    pub basis: Basis,
}

/// Splits `n` into `a + b` for the product `X^n = X^a · X^b`.
///
/// Powers of two are halved, which keeps the depth of `X^n` optimal; other
/// degrees maximise the number of odd terms.
pub fn split_degree(n: usize) -> (usize, usize) {
    if n.is_power_of_two() {
        (n / 2, n / 2)
    } else {
        let k = bit_length(n - 1) - 1;
        ((1 << k) - 1, n + 1 - (1 << k))
    }
}

impl<C: Element> PowerBasis<C> {
    pub fn new(ct: C, basis: Basis) -> Self {
        let mut value = BTreeMap::new();
        value.insert(1, ct);
        Self { value, basis }
    }

    pub fn get(&self, n: usize) -> EvalResult<&C> {
        self.value
            .get(&n)
            .ok_or(EvalError::MissingPowerBasis { power: n })
    }

    /// Makes sure `X^n` is present, generating the missing intermediate
    /// powers first. A no-op when `X^n` already exists.
    ///
    /// With `lazy`, the top-level product is not relinearized and `X^n` is
    /// left with degree 2.
    pub fn gen_power<E>(&mut self, n: usize, lazy: bool, eval: &E) -> EvalResult<()>
    where
        E: Arithmetic<Ciphertext = C>,
    {
        if n < 1 {
            return Err(EvalError::invalid("power basis exponents start at 1"));
        }
        if !self.value.contains_key(&1) {
            return Err(EvalError::MissingPowerBasis { power: 1 });
        }
        if self.gen_power_inner(n, lazy, eval)? {
            let top = self.entry(n)?;
            eval.rescale(top)?;
        }
        Ok(())
    }

    /// Returns whether `X^n` was generated by this call, in which case it
    /// still has to be rescaled.
    fn gen_power_inner<E>(&mut self, n: usize, lazy: bool, eval: &E) -> EvalResult<bool>
    where
        E: Arithmetic<Ciphertext = C>,
    {
        if self.value.contains_key(&n) {
            return Ok(false);
        }

        let is_pow2 = n.is_power_of_two();
        let (a, b) = split_degree(n);
        let c = a.abs_diff(b);

        let rescale_a = self.gen_power_inner(a, lazy && !is_pow2, eval)?;
        let rescale_b = self.gen_power_inner(b, lazy && !is_pow2, eval)?;

        if lazy {
            for i in [a, b] {
                let x = self.entry(i)?;
                if x.degree() == 2 {
                    eval.relinearize(x)?;
                }
            }
        }
        if rescale_a {
            eval.rescale(self.entry(a)?)?;
        }
        if rescale_b {
            eval.rescale(self.entry(b)?)?;
        }

        let (xa, xb) = (self.get(a)?, self.get(b)?);
        let mut xn = if lazy {
            eval.mul(xa, Operand::Ciphertext(xb))?
        } else {
            eval.mul_relin(xa, Operand::Ciphertext(xb))?
        };
        trace!(n, a, b, level = xn.level(), "generated power");

        if self.basis == Basis::Chebyshev {
            // T_n = 2·T_a·T_b - T_|a-b|
            xn = eval.add(&xn, Operand::Ciphertext(&xn))?;
            if c == 0 {
                xn = eval.add(&xn, Operand::real(-1.0))?;
            } else {
                self.gen_power(c, lazy, eval)?;
                xn = eval.sub(&xn, Operand::Ciphertext(self.get(c)?))?;
            }
        }

        self.value.insert(n, xn);
        Ok(true)
    }

    fn entry(&mut self, n: usize) -> EvalResult<&mut C> {
        self.value
            .get_mut(&n)
            .ok_or(EvalError::MissingPowerBasis { power: n })
    }

    /// Exponents currently held by the basis.
    pub fn powers(&self) -> Vec<usize> {
        self.value.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::he::{SimEvaluator, SimOperand};
    use crate::params::Parameters;
    use std::sync::Arc;

    fn sim() -> SimEvaluator {
        let params = Parameters::builder()
            .log_n(10)
            .log_q(vec![55, 45, 45, 45, 45, 45, 45])
            .build()
            .unwrap();
        SimEvaluator::new(Arc::new(params))
    }

    #[test]
    fn split_degree_halves_powers_of_two() {
        assert_eq!(split_degree(8), (4, 4));
        assert_eq!(split_degree(7), (3, 4));
        assert_eq!(split_degree(5), (3, 2));
        assert_eq!(split_degree(3), (1, 2));
        for n in 2..200 {
            let (a, b) = split_degree(n);
            assert_eq!(a + b, n);
            assert!(a >= 1 && b >= 1);
        }
    }

    #[test]
    fn powers_of_two_follow_the_doubling_chain() {
        let sim = sim();
        let x = SimOperand::new(6, sim.parameters().default_scale());
        let mut pb = PowerBasis::new(x, Basis::Monomial);
        pb.gen_power(8, false, &sim).unwrap();
        assert_eq!(pb.powers(), vec![1, 2, 4, 8]);
        assert_eq!(pb.get(8).unwrap().level, 3);
        assert_eq!(pb.get(2).unwrap().level, 5);

        pb.gen_power(7, false, &sim).unwrap();
        assert_eq!(pb.powers(), vec![1, 2, 3, 4, 7, 8]);
        assert_eq!(pb.get(7).unwrap().level, 3);
    }

    #[test]
    fn lazy_powers_keep_degree_two() {
        let sim = sim();
        let x = SimOperand::new(6, sim.parameters().default_scale());
        let mut pb = PowerBasis::new(x, Basis::Monomial);
        pb.gen_power(3, true, &sim).unwrap();
        assert_eq!(pb.get(3).unwrap().degree, 2);
        assert_eq!(pb.get(2).unwrap().degree, 1);
    }

    #[test]
    fn missing_base_is_reported() {
        let sim = sim();
        let mut pb: PowerBasis<SimOperand> = PowerBasis {
            value: BTreeMap::new(),
            basis: Basis::Monomial,
        };
        assert_eq!(
            pb.gen_power(4, false, &sim),
            Err(EvalError::MissingPowerBasis { power: 1 })
        );
    }
}
