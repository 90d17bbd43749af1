use super::{Parameters, Precision, RingType};
use crate::errors::{EvalError, EvalResult};
use crate::math::{generate_ntt_primes, is_ntt_friendly_prime};

const MAX_LOG_N: u32 = 17;
const DEFAULT_LOG_P: u32 = 61;

/// Chained construction of [`Parameters`].
///
/// Moduli are given either as bit sizes (`log_q`, `log_p`), in which case an
/// NTT-friendly chain is generated, or explicitly (`q`, `p`).
#[derive(Debug, Clone, Default)]
pub struct ParametersBuilder {
    log_n: Option<u32>,
    log_q: Vec<u32>,
    log_p: Vec<u32>,
    q: Option<Vec<u64>>,
    p: Option<Vec<u64>>,
    log_default_scale: Option<u32>,
    ring_type: RingType,
    precision: Precision,
}

impl ParametersBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_n(mut self, log_n: u32) -> Self {
        self.log_n = Some(log_n);
        self
    }

    pub fn log_q(mut self, log_q: Vec<u32>) -> Self {
        self.log_q = log_q;
        self
    }

    pub fn log_p(mut self, log_p: Vec<u32>) -> Self {
        self.log_p = log_p;
        self
    }

    pub fn q(mut self, q: Vec<u64>) -> Self {
        self.q = Some(q);
        self
    }

    pub fn p(mut self, p: Vec<u64>) -> Self {
        self.p = Some(p);
        self
    }

    pub fn log_default_scale(mut self, log_scale: u32) -> Self {
        self.log_default_scale = Some(log_scale);
        self
    }

    pub fn ring_type(mut self, ring_type: RingType) -> Self {
        self.ring_type = ring_type;
        self
    }

    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn build(self) -> EvalResult<Parameters> {
        let log_n = self
            .log_n
            .ok_or_else(|| EvalError::invalid("log_n is required"))?;
        if !(2..=MAX_LOG_N).contains(&log_n) {
            return Err(EvalError::invalid(format!(
                "log_n must be in [2, {MAX_LOG_N}], got {log_n}"
            )));
        }
        let n = 1u64 << log_n;

        let q = match self.q {
            Some(q) => q,
            None => {
                check_bit_sizes("log_q", &self.log_q, n)?;
                generate_ntt_primes(&self.log_q, n, &[])
            }
        };
        if q.is_empty() {
            return Err(EvalError::invalid("the Q moduli chain is empty"));
        }

        let p = match self.p {
            Some(p) => p,
            None => {
                let log_p = if self.log_p.is_empty() {
                    vec![DEFAULT_LOG_P]
                } else {
                    self.log_p
                };
                check_bit_sizes("log_p", &log_p, n)?;
                generate_ntt_primes(&log_p, n, &q)
            }
        };
        if p.is_empty() {
            return Err(EvalError::invalid("the P moduli chain is empty"));
        }

        let mut seen = Vec::with_capacity(q.len() + p.len());
        for &modulus in q.iter().chain(&p) {
            if !is_ntt_friendly_prime(modulus, n) {
                return Err(EvalError::invalid(format!(
                    "modulus {modulus} is not an NTT-friendly prime for N = {n}"
                )));
            }
            if seen.contains(&modulus) {
                return Err(EvalError::invalid(format!("modulus {modulus} is repeated")));
            }
            seen.push(modulus);
        }

        let lcr = match self.precision {
            Precision::Prec64 => 1,
            Precision::Prec128 => 2,
        };
        let log_default_scale = match self.log_default_scale {
            Some(log_scale) => log_scale,
            None => {
                let start = if q.len() > lcr { 1 } else { 0 };
                let bits: f64 = q[start..(start + lcr).min(q.len())]
                    .iter()
                    .map(|&m| (m as f64).log2())
                    .sum();
                bits.round() as u32
            }
        };
        if log_default_scale == 0 {
            return Err(EvalError::invalid("log_default_scale must be positive"));
        }

        Ok(Parameters {
            log_n,
            q,
            p,
            log_default_scale,
            ring_type: self.ring_type,
            precision: self.precision,
        })
    }
}

fn check_bit_sizes(name: &str, bits: &[u32], n: u64) -> EvalResult<()> {
    if bits.is_empty() {
        return Err(EvalError::invalid(format!("{name} is empty")));
    }
    let min_bits = (2 * n).ilog2() + 2;
    for &b in bits {
        if !(min_bits..=61).contains(&b) {
            return Err(EvalError::invalid(format!(
                "{name} entry {b} must be in [{min_bits}, 61]"
            )));
        }
    }
    Ok(())
}
