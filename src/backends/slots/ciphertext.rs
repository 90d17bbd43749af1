use crate::he::Element;
use crate::scale::Scale;
use num_complex::Complex64;

/// Ciphertext of the slot backend.
///
/// `values` holds the scaled message `m · scale` plus the accumulated noise,
/// exactly what decryption followed by the canonical embedding would give.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotCiphertext {
    pub(crate) values: Vec<Complex64>,
    pub(crate) level: usize,
    pub(crate) degree: usize,
    pub(crate) scale: Scale,
}

impl SlotCiphertext {
    pub fn slots(&self) -> usize {
        self.values.len()
    }

    /// Scaled slot values, `m · scale` plus noise.
    pub fn values(&self) -> &[Complex64] {
        &self.values
    }
}

impl Element for SlotCiphertext {
    fn level(&self) -> usize {
        self.level
    }

    fn degree(&self) -> usize {
        self.degree
    }

    fn scale(&self) -> Scale {
        self.scale
    }

    fn set_scale(&mut self, scale: Scale) {
        self.scale = scale;
    }
}

/// Encoded plaintext: rounded `m · scale` per slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotPlaintext {
    pub(crate) values: Vec<Complex64>,
    pub(crate) level: usize,
    pub(crate) scale: Scale,
}

impl SlotPlaintext {
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn values(&self) -> &[Complex64] {
        &self.values
    }
}
