use super::{NoiseSource, SlotCiphertext};
use crate::errors::{EvalError, EvalResult};
use crate::he::Bootstrapper;
use crate::params::Parameters;
use std::cell::Cell;
use std::sync::Arc;
use tracing::debug;

/// Bootstrapping for the slot backend.
///
/// Re-encrypts the message at `output_level` and the default scale, adding a
/// relative error of about `2^-precision_bits`.
#[derive(Debug)]
pub struct SlotBootstrapper {
    params: Arc<Parameters>,
    minimum_input_level: usize,
    output_level: usize,
    precision_bits: u32,
    noise: NoiseSource,
    invocations: Cell<usize>,
}

impl SlotBootstrapper {
    pub fn new(
        params: Arc<Parameters>,
        minimum_input_level: usize,
        output_level: usize,
        seed: u64,
    ) -> EvalResult<Self> {
        if output_level > params.max_level() || minimum_input_level > output_level {
            return Err(EvalError::invalid(format!(
                "bootstrapping levels {minimum_input_level} -> {output_level} \
                 outside [0, {}]",
                params.max_level()
            )));
        }
        Ok(Self {
            params,
            minimum_input_level,
            output_level,
            precision_bits: 32,
            noise: NoiseSource::new(seed),
            invocations: Cell::new(0),
        })
    }

    pub fn with_precision_bits(mut self, bits: u32) -> Self {
        self.precision_bits = bits;
        self
    }

    /// Number of ciphertexts bootstrapped so far.
    pub fn invocations(&self) -> usize {
        self.invocations.get()
    }
}

impl Bootstrapper<SlotCiphertext> for SlotBootstrapper {
    fn bootstrap(&self, ct: &SlotCiphertext) -> EvalResult<SlotCiphertext> {
        if ct.level < self.minimum_input_level {
            return Err(EvalError::InsufficientLevel {
                operation: "bootstrap",
                level: ct.level,
                required: self.minimum_input_level,
            });
        }
        if ct.degree > 1 {
            return Err(EvalError::invalid(
                "bootstrapping requires a relinearized ciphertext",
            ));
        }
        self.invocations.set(self.invocations.get() + 1);
        debug!(level = ct.level, output_level = self.output_level, "bootstrapping");

        let scale = self.params.default_scale();
        let ratio = scale.value() / ct.scale.value();
        let mut values: Vec<_> = ct.values.iter().map(|v| v * ratio).collect();
        let std_dev = scale.value() * 2f64.powi(-(self.precision_bits as i32));
        self.noise.add(&mut values, std_dev, self.params.ring_type());
        Ok(SlotCiphertext {
            values,
            level: self.output_level,
            degree: 1,
            scale,
        })
    }

    fn minimum_input_level(&self) -> usize {
        self.minimum_input_level
    }

    fn output_level(&self) -> usize {
        self.output_level
    }
}
