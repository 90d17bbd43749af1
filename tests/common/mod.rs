#![allow(dead_code)]

use std::sync::Arc;

use heaan_poly_eval::backends::slots::{SlotCiphertext, SlotEncoder, SlotEncryptor, SlotEvaluator};
use heaan_poly_eval::{Parameters, Precision, RingType, Scale};
use num_complex::Complex64;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

pub const SEED: u64 = 0x5eed;

/// `log_n = 10`, a 55-bit base modulus followed by `levels` 45-bit moduli.
pub fn parameters(levels: usize, ring_type: RingType) -> Arc<Parameters> {
    let mut log_q = vec![55];
    log_q.extend(std::iter::repeat_n(45, levels));
    Arc::new(
        Parameters::builder()
            .log_n(10)
            .log_q(log_q)
            .log_p(vec![61, 61])
            .ring_type(ring_type)
            .precision(Precision::Prec64)
            .build()
            .expect("parameters"),
    )
}

pub struct Harness {
    pub params: Arc<Parameters>,
    pub eval: SlotEvaluator,
    pub encoder: SlotEncoder,
    pub encryptor: SlotEncryptor,
}

impl Harness {
    pub fn new(levels: usize) -> Self {
        Self::with_ring(levels, RingType::Standard)
    }

    pub fn with_ring(levels: usize, ring_type: RingType) -> Self {
        let params = parameters(levels, ring_type);
        Self {
            eval: SlotEvaluator::new(params.clone(), SEED),
            encoder: SlotEncoder::new(params.clone()),
            encryptor: SlotEncryptor::new(params.clone(), SEED + 1),
            params,
        }
    }

    pub fn slots(&self) -> usize {
        self.params.max_slots()
    }

    pub fn encrypt_real(&self, values: &[f64], level: usize, scale: Scale) -> SlotCiphertext {
        let pt = self
            .encoder
            .encode_real(values, level, scale)
            .expect("encode");
        self.encryptor.encrypt(&pt)
    }

    pub fn encrypt(&self, values: &[Complex64], level: usize) -> SlotCiphertext {
        use heaan_poly_eval::Encoder;
        let pt = self
            .encoder
            .encode(values, level, self.params.default_scale())
            .expect("encode");
        self.encryptor.encrypt(&pt)
    }

    pub fn decrypt(&self, ct: &SlotCiphertext) -> Vec<Complex64> {
        self.encoder.decode(&self.encryptor.decrypt(ct))
    }

    pub fn decrypt_real(&self, ct: &SlotCiphertext) -> Vec<f64> {
        self.decrypt(ct).iter().map(|c| c.re).collect()
    }
}

/// `n` values uniform in `[lo, hi]`.
pub fn uniform(n: usize, lo: f64, hi: f64, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    (0..n).map(|_| rng.random_range(lo..=hi)).collect()
}

pub fn max_abs_error(got: &[f64], want: &[f64]) -> f64 {
    got.iter()
        .zip(want)
        .map(|(g, w)| (g - w).abs())
        .fold(0.0, f64::max)
}
