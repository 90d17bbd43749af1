//! Fixed-point scaling factors.
//!
//! A [`Scale`] is the factor `Δ` such that a slot value `m` is stored as
//! `round(m · Δ)`. Scales are tracked in `f64`; every place that compares two
//! scales does so in relative terms through [`Scale::in_delta`].
use std::fmt;
use std::ops::{Div, Mul};

/// Number of mantissa bits carried by a [`Scale`].
pub const SCALE_PRECISION: u32 = f64::MANTISSA_DIGITS;

/// Relative tolerance (in bits) used when asserting that two independently
/// computed scales are the same value.
pub const SCALE_TOLERANCE_BITS: u32 = SCALE_PRECISION - 12;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Scale(f64);

impl Scale {
    pub fn new(value: f64) -> Self {
        assert!(
            value.is_finite() && value > 0.0,
            "Scale::new: scale must be finite and positive, got {value}"
        );
        Self(value)
    }

    pub fn from_log2(log_scale: f64) -> Self {
        Self::new(log_scale.exp2())
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn log2(&self) -> f64 {
        self.0.log2()
    }

    /// Returns `true` if `|self - other| / max(self, other) <= 2^-log_accuracy`.
    pub fn in_delta(&self, other: Scale, log_accuracy: u32) -> bool {
        let diff = (self.0 - other.0).abs();
        diff <= self.0.max(other.0) * (-(log_accuracy as f64)).exp2()
    }

    pub fn sqrt(&self) -> Self {
        Self(self.0.sqrt())
    }

    pub fn max(self, other: Scale) -> Self {
        if self.0 >= other.0 { self } else { other }
    }
}

impl Mul for Scale {
    type Output = Scale;

    fn mul(self, rhs: Scale) -> Scale {
        Scale(self.0 * rhs.0)
    }
}

impl Mul<f64> for Scale {
    type Output = Scale;

    fn mul(self, rhs: f64) -> Scale {
        Scale::new(self.0 * rhs)
    }
}

impl Div for Scale {
    type Output = Scale;

    fn div(self, rhs: Scale) -> Scale {
        Scale(self.0 / rhs.0)
    }
}

impl Div<f64> for Scale {
    type Output = Scale;

    fn div(self, rhs: f64) -> Scale {
        Scale::new(self.0 / rhs)
    }
}

impl From<u64> for Scale {
    fn from(modulus: u64) -> Self {
        Scale::new(modulus as f64)
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "2^{:.6}", self.log2())
    }
}

/// Integer factors `(r0, r1)` by which two operands of scales `s0` and `s1`
/// are multiplied before an addition so that their scales line up.
///
/// Only the operand with the smaller scale is ever multiplied, and only by
/// the rounded ratio when that ratio is at least 2. Ratios close to one are
/// left alone and the result takes the larger scale.
pub fn match_scales(s0: Scale, s1: Scale) -> (u64, u64) {
    if s0.0 > s1.0 {
        let ratio = (s0.0 / s1.0).round();
        if ratio >= 2.0 && ratio < u64::MAX as f64 {
            return (1, ratio as u64);
        }
    } else if s1.0 > s0.0 {
        let ratio = (s1.0 / s0.0).round();
        if ratio >= 2.0 && ratio < u64::MAX as f64 {
            return (ratio as u64, 1);
        }
    }
    (1, 1)
}

/// Scale of `a + b` once [`match_scales`] has been applied.
pub fn added_scale(s0: Scale, s1: Scale) -> Scale {
    let (r0, r1) = match_scales(s0, s1);
    (s0 * r0 as f64).max(s1 * r1 as f64)
}
