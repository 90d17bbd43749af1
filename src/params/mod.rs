//! Scheme parameters consumed by every evaluator.
//!
//! Parameters are immutable once built and are shared between evaluator
//! copies behind an `Arc`.
pub mod builder;

pub use builder::ParametersBuilder;

use crate::scale::Scale;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RingType {
    /// `Z[X]/(X^N + 1)`, `N/2` complex slots.
    #[default]
    Standard,
    /// `Z[X + X^-1]/(X^2N + 1)`, `N` real slots; conjugation is undefined.
    ConjugateInvariant,
}

impl fmt::Display for RingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingType::Standard => write!(f, "Standard"),
            RingType::ConjugateInvariant => write!(f, "ConjugateInvariant"),
        }
    }
}

impl RingType {
    pub fn name(&self) -> &'static str {
        match self {
            RingType::Standard => "Standard",
            RingType::ConjugateInvariant => "ConjugateInvariant",
        }
    }
}

/// Word precision of the scaling factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    /// One modulus per rescale.
    #[default]
    Prec64,
    /// Scales span two machine words, every rescale drops two moduli.
    Prec128,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    log_n: u32,
    q: Vec<u64>,
    p: Vec<u64>,
    log_default_scale: u32,
    ring_type: RingType,
    precision: Precision,
}

impl Parameters {
    pub fn builder() -> ParametersBuilder {
        ParametersBuilder::new()
    }

    pub fn log_n(&self) -> u32 {
        self.log_n
    }

    pub fn n(&self) -> usize {
        1 << self.log_n
    }

    pub fn ring_type(&self) -> RingType {
        self.ring_type
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn log_max_slots(&self) -> u32 {
        match self.ring_type {
            RingType::Standard => self.log_n - 1,
            RingType::ConjugateInvariant => self.log_n,
        }
    }

    pub fn max_slots(&self) -> usize {
        1 << self.log_max_slots()
    }

    pub fn q(&self) -> &[u64] {
        &self.q
    }

    pub fn p(&self) -> &[u64] {
        &self.p
    }

    pub fn max_level(&self) -> usize {
        self.q.len() - 1
    }

    pub fn max_level_p(&self) -> usize {
        self.p.len() - 1
    }

    pub fn log_default_scale(&self) -> u32 {
        self.log_default_scale
    }

    pub fn default_scale(&self) -> Scale {
        Scale::from_log2(self.log_default_scale as f64)
    }

    pub fn levels_consumed_per_rescaling(&self) -> usize {
        match self.precision {
            Precision::Prec64 => 1,
            Precision::Prec128 => 2,
        }
    }

    /// Product of the moduli dropped by one rescale of a ciphertext at `level`.
    ///
    /// # Panics
    ///
    /// Panics if `level + 1 < levels_consumed_per_rescaling()`.
    pub fn rescale_factor(&self, level: usize) -> f64 {
        let lcr = self.levels_consumed_per_rescaling();
        assert!(
            level + 1 >= lcr,
            "rescale_factor: level {level} cannot drop {lcr} moduli"
        );
        (0..lcr).map(|i| self.q[level - i] as f64).product()
    }

    /// Number of lazy (unreduced) accumulations a `Q` accumulator at `level`
    /// tolerates before it must be reduced.
    pub fn qi_overflow_margin(&self, level: usize) -> usize {
        overflow_margin(&self.q[..=level])
    }

    /// Same as [`Self::qi_overflow_margin`] for the auxiliary `P` moduli.
    pub fn pi_overflow_margin(&self, level: usize) -> usize {
        overflow_margin(&self.p[..=level])
    }
}

fn overflow_margin(moduli: &[u64]) -> usize {
    let max = moduli.iter().copied().max().unwrap_or(1);
    ((u64::MAX / max) as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_depend_on_ring_type() {
        let standard = Parameters::builder()
            .log_n(10)
            .log_q(vec![55, 45, 45])
            .build()
            .unwrap();
        assert_eq!(standard.max_slots(), 512);
        assert_eq!(standard.max_level(), 2);
        assert_eq!(standard.levels_consumed_per_rescaling(), 1);

        let ci = Parameters::builder()
            .log_n(10)
            .log_q(vec![55, 45, 45])
            .ring_type(RingType::ConjugateInvariant)
            .build()
            .unwrap();
        assert_eq!(ci.max_slots(), 1024);
    }

    #[test]
    fn overflow_margin_follows_largest_modulus() {
        let params = Parameters::builder()
            .log_n(10)
            .log_q(vec![61, 40])
            .log_p(vec![61])
            .build()
            .unwrap();
        assert_eq!(params.qi_overflow_margin(1), 7);
        assert!(params.pi_overflow_margin(0) >= 7);
    }

    #[test]
    fn double_word_rescale_drops_two_moduli() {
        let params = Parameters::builder()
            .log_n(10)
            .log_q(vec![60, 45, 45, 45, 45])
            .precision(Precision::Prec128)
            .log_default_scale(90)
            .build()
            .unwrap();
        assert_eq!(params.levels_consumed_per_rescaling(), 2);
        let expected = params.q()[4] as f64 * params.q()[3] as f64;
        assert_eq!(params.rescale_factor(4), expected);
    }
}
