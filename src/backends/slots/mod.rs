//! Reference backend over cleartext slots.
//!
//! Ciphertexts carry the decrypted, decoded slot values `m · scale` together
//! with the exact level, degree and scale metadata a lattice-based CKKS
//! implementation would maintain. Every operation applies the same scale
//! rules, rounding of scaled constants and moduli chain as the real scheme,
//! and injects Gaussian noise where encryption, key-switching and rescaling
//! would. It is deterministic for a given seed.
//!
//! The backend gives no security whatsoever; it exists to drive and test the
//! scheme-agnostic evaluators in [`crate::he`] and [`crate::hefloat`].
mod bootstrapper;
mod ciphertext;
mod encoder;
mod evaluator;

pub use bootstrapper::SlotBootstrapper;
pub use ciphertext::{SlotCiphertext, SlotPlaintext};
pub use encoder::{SlotEncoder, SlotEncryptor};
pub use evaluator::{OperationCounters, SlotDecomposition, SlotEvaluator, SlotExtended};

use crate::params::{Parameters, RingType};
use num_complex::Complex64;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};
use std::cell::RefCell;

/// Error standard deviation of the discrete Gaussian.
pub const SIGMA: f64 = 3.2;

/// Standard deviations of the noise added by each kind of operation, in
/// units of the scaled slot values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseModel {
    pub fresh: f64,
    pub key_switch: f64,
    pub rounding: f64,
}

impl NoiseModel {
    /// Noise magnitudes of a ring of degree `N`: `σ·√N` for encryption and
    /// key-switching, `√(N/12)` for the rounding of a rescale.
    pub fn for_parameters(params: &Parameters) -> Self {
        let n = params.n() as f64;
        Self {
            fresh: SIGMA * n.sqrt(),
            key_switch: SIGMA * n.sqrt(),
            rounding: (n / 12.0).sqrt(),
        }
    }

    pub fn none() -> Self {
        Self {
            fresh: 0.0,
            key_switch: 0.0,
            rounding: 0.0,
        }
    }
}

/// Seeded Gaussian noise, owned by a single evaluator copy.
#[derive(Debug)]
pub(crate) struct NoiseSource {
    rng: RefCell<ChaCha20Rng>,
}

impl NoiseSource {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            rng: RefCell::new(ChaCha20Rng::seed_from_u64(seed)),
        }
    }

    /// Independent source seeded from this one.
    pub(crate) fn fork(&self) -> Self {
        let seed = self.rng.borrow_mut().random::<u64>();
        Self::new(seed)
    }

    pub(crate) fn add(&self, values: &mut [Complex64], std_dev: f64, ring: RingType) {
        if std_dev <= 0.0 {
            return;
        }
        let Ok(normal) = Normal::new(0.0, std_dev) else {
            return;
        };
        let mut rng = self.rng.borrow_mut();
        for v in values.iter_mut() {
            v.re += normal.sample(&mut *rng);
            if ring == RingType::Standard {
                v.im += normal.sample(&mut *rng);
            }
        }
    }
}

/// Rounds `c · scale` to the nearest Gaussian integer.
pub(crate) fn scale_up(c: Complex64, scale: f64) -> Complex64 {
    Complex64::new((c.re * scale).round(), (c.im * scale).round())
}

/// Scales and rounds `values` into a full slot vector, zero padded.
pub(crate) fn encode_slots(
    params: &Parameters,
    values: &[Complex64],
    scale: f64,
) -> Option<Vec<Complex64>> {
    let slots = params.max_slots();
    if values.len() > slots {
        return None;
    }
    let mut out = vec![Complex64::new(0.0, 0.0); slots];
    for (o, &v) in out.iter_mut().zip(values) {
        *o = scale_up(v, scale);
        if params.ring_type() == RingType::ConjugateInvariant {
            o.im = 0.0;
        }
    }
    Some(out)
}
