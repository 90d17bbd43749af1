use super::{Basis, Polynomial};
use crate::errors::{EvalError, EvalResult};

/// Several polynomials of equal degree evaluated on a single ciphertext.
///
/// `mapping[slot]` names the polynomial applied to that slot. Without a
/// mapping the vector must hold exactly one polynomial, applied to all slots.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialVector {
    pub value: Vec<Polynomial>,
    pub mapping: Option<Vec<usize>>,
}

impl PolynomialVector {
    pub fn new(value: Vec<Polynomial>, mapping: Option<Vec<usize>>) -> EvalResult<Self> {
        let Some(first) = value.first() else {
            return Err(EvalError::invalid("polynomial vector is empty"));
        };
        for p in &value[1..] {
            if p.degree() != first.degree() {
                return Err(EvalError::invalid(format!(
                    "polynomials of a vector must share a degree, got {} and {}",
                    first.degree(),
                    p.degree()
                )));
            }
            if p.basis != first.basis {
                return Err(EvalError::invalid(
                    "polynomials of a vector must share a basis",
                ));
            }
        }
        match &mapping {
            None if value.len() > 1 => {
                return Err(EvalError::invalid(
                    "a mapping is required when the vector holds several polynomials",
                ));
            }
            Some(mapping) => {
                if let Some(&bad) = mapping.iter().find(|&&i| i >= value.len()) {
                    return Err(EvalError::invalid(format!(
                        "mapping index {bad} out of range for {} polynomials",
                        value.len()
                    )));
                }
            }
            None => {}
        }
        Ok(Self { value, mapping })
    }

    pub fn single(p: Polynomial) -> Self {
        Self {
            value: vec![p],
            mapping: None,
        }
    }

    pub fn degree(&self) -> usize {
        self.value[0].degree()
    }

    pub fn depth(&self) -> usize {
        self.value[0].depth()
    }

    pub fn basis(&self) -> Basis {
        self.value[0].basis
    }

    pub fn lazy(&self) -> bool {
        self.value[0].lazy
    }

    pub fn is_odd(&self) -> bool {
        self.value.iter().all(|p| p.is_odd)
    }

    pub fn is_even(&self) -> bool {
        self.value.iter().all(|p| p.is_even)
    }

    /// Splits every polynomial at `n`, see [`Polynomial::factorize`].
    pub fn factorize(&self, n: usize) -> (PolynomialVector, PolynomialVector) {
        let (quotient, remainder): (Vec<_>, Vec<_>) =
            self.value.iter().map(|p| p.factorize(n)).unzip();
        (
            PolynomialVector {
                value: quotient,
                mapping: self.mapping.clone(),
            },
            PolynomialVector {
                value: remainder,
                mapping: self.mapping.clone(),
            },
        )
    }
}

impl From<Polynomial> for PolynomialVector {
    fn from(p: Polynomial) -> Self {
        Self::single(p)
    }
}
