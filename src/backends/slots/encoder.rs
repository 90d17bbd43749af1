use super::{NoiseModel, NoiseSource, SlotCiphertext, SlotPlaintext, encode_slots};
use crate::errors::{EvalError, EvalResult};
use crate::he::Encoder;
use crate::params::Parameters;
use crate::scale::Scale;
use num_complex::Complex64;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SlotEncoder {
    params: Arc<Parameters>,
}

impl SlotEncoder {
    pub fn new(params: Arc<Parameters>) -> Self {
        Self { params }
    }

    pub fn decode(&self, pt: &SlotPlaintext) -> Vec<Complex64> {
        let scale = pt.scale.value();
        pt.values.iter().map(|v| v / scale).collect()
    }

    pub fn encode_real(&self, values: &[f64], level: usize, scale: Scale) -> EvalResult<SlotPlaintext> {
        let values: Vec<Complex64> = values.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        self.encode(&values, level, scale)
    }
}

impl Encoder for SlotEncoder {
    type Plaintext = SlotPlaintext;

    fn encode(&self, values: &[Complex64], level: usize, scale: Scale) -> EvalResult<SlotPlaintext> {
        if level > self.params.max_level() {
            return Err(EvalError::invalid(format!(
                "level {level} above the maximum level {}",
                self.params.max_level()
            )));
        }
        let values = encode_slots(&self.params, values, scale.value()).ok_or_else(|| {
            EvalError::invalid(format!(
                "{} values do not fit in {} slots",
                values.len(),
                self.params.max_slots()
            ))
        })?;
        Ok(SlotPlaintext {
            values,
            level,
            scale,
        })
    }
}

/// Encrypts and decrypts slot plaintexts.
#[derive(Debug)]
pub struct SlotEncryptor {
    params: Arc<Parameters>,
    noise: NoiseSource,
    model: NoiseModel,
}

impl SlotEncryptor {
    pub fn new(params: Arc<Parameters>, seed: u64) -> Self {
        let model = NoiseModel::for_parameters(&params);
        Self {
            params,
            noise: NoiseSource::new(seed),
            model,
        }
    }

    pub fn with_noise(mut self, model: NoiseModel) -> Self {
        self.model = model;
        self
    }

    pub fn encrypt(&self, pt: &SlotPlaintext) -> SlotCiphertext {
        let mut values = pt.values.clone();
        self.noise
            .add(&mut values, self.model.fresh, self.params.ring_type());
        SlotCiphertext {
            values,
            level: pt.level,
            degree: 1,
            scale: pt.scale,
        }
    }

    pub fn decrypt(&self, ct: &SlotCiphertext) -> SlotPlaintext {
        SlotPlaintext {
            values: ct.values.clone(),
            level: ct.level,
            scale: ct.scale,
        }
    }
}
