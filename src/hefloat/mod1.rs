//! Homomorphic `x mod 1`, the modular reduction step of bootstrapping.
//!
//! The input holds `x = I + e` with an integer `I` in `[-K, K]` and a small
//! `e`. The reduction evaluates a scaled sine (or a shifted cosine followed
//! by double-angle rounds) so that the output decodes to `q_diff · e`, where
//! `q_diff = Q_0 / 2^round(log2 Q_0)` absorbs the gap between the first
//! modulus and its nearest power of two.
use crate::errors::{EvalError, EvalResult};
use crate::he::{Arithmetic, Element, Operand, PolynomialEvaluator};
use crate::math::linalg::least_squares;
use crate::params::Parameters;
use crate::polynomial::Polynomial;
use crate::scale::Scale;
use std::f64::consts::{FRAC_1_PI, PI};
use tracing::{debug, instrument};

const INV_2PI: f64 = 0.5 * FRAC_1_PI;

/// Samples fitted around each integer by the discrete cosine approximation.
const DISCRETE_SAMPLES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mod1Type {
    /// Least-squares fit of `cos(2π(x - 1/4) / 2^r)` restricted to small
    /// neighbourhoods of the integers.
    #[default]
    CosDiscrete,
    /// Chebyshev interpolant of `sin(2πx)` on the whole interval. Double-angle
    /// rounds are not used.
    SinContinuous,
    /// Chebyshev interpolant of `cos(2π(x - 1/4) / 2^r)` on the whole interval.
    CosContinuous,
}

/// User-facing description of a modular reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct Mod1ParametersLiteral {
    /// Level the input is dropped to before evaluation.
    pub level_q: usize,
    /// Log2 of the scale the reduction works at.
    pub log_scale: u32,
    pub mod1_type: Mod1Type,
    /// Log2 of `Q_0 / |m|`: the message occupies `|e| <= 2^-log_message_ratio`.
    pub log_message_ratio: u32,
    /// Bound on `|I|`.
    pub k: usize,
    pub mod1_degree: usize,
    pub double_angle: usize,
    /// Degree of the arcsine correction, 0 to disable it.
    pub mod1_inv_degree: usize,
}

impl Mod1ParametersLiteral {
    /// The usual bootstrapping setting at `level_q`.
    pub fn new(level_q: usize, log_scale: u32) -> Self {
        Self {
            level_q,
            log_scale,
            mod1_type: Mod1Type::CosDiscrete,
            log_message_ratio: 8,
            k: 16,
            mod1_degree: 30,
            double_angle: 3,
            mod1_inv_degree: 0,
        }
    }
}

/// Precomputed polynomials and constants of a modular reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct Mod1Parameters {
    pub level_q: usize,
    pub log_scale: u32,
    pub mod1_type: Mod1Type,
    pub log_message_ratio: u32,
    /// Bound on `|I|`, before the double-angle shrink.
    pub k: f64,
    /// Number of double-angle rounds actually applied.
    pub double_angle: usize,
    pub q_diff: f64,
    /// Amplitude folded into the first polynomial so that the double-angle
    /// rounds end on `q_diff / 2π`.
    pub sqrt2pi: f64,
    pub mod1_poly: Polynomial,
    pub mod1_inv_poly: Option<Polynomial>,
    levels_per_rescale: usize,
}

impl Mod1Parameters {
    pub fn new(params: &Parameters, literal: &Mod1ParametersLiteral) -> EvalResult<Self> {
        if literal.level_q > params.max_level() {
            return Err(EvalError::invalid(format!(
                "mod1 level {} above the maximum level {}",
                literal.level_q,
                params.max_level()
            )));
        }
        if literal.k == 0 || literal.mod1_degree == 0 {
            return Err(EvalError::invalid("mod1 requires K >= 1 and a positive degree"));
        }
        if literal.mod1_inv_degree > 0 && literal.mod1_inv_degree % 2 == 0 {
            return Err(EvalError::invalid("the arcsine correction must have an odd degree"));
        }

        let double_angle = match literal.mod1_type {
            Mod1Type::SinContinuous => 0,
            _ => literal.double_angle,
        };
        let shrink = (double_angle as f64).exp2();
        let k = literal.k as f64;
        let k_shrunk = k / shrink;

        let q0 = params.q()[0] as f64;
        let q_diff = q0 / q0.log2().round().exp2();

        let (mod1_inv_poly, sqrt2pi) = if literal.mod1_inv_degree > 0 {
            (Some(arcsine(literal.mod1_inv_degree, q_diff)?), 1.0)
        } else {
            (None, (INV_2PI * q_diff).powf(1.0 / shrink))
        };

        let degree = literal.mod1_degree;
        let interval = [-k_shrunk, k_shrunk];
        let mut coeffs = match literal.mod1_type {
            Mod1Type::SinContinuous => {
                crate::math::chebyshev_approximation(|t| (2.0 * PI * t).sin(), degree + 1, -k, k)
            }
            Mod1Type::CosContinuous => crate::math::chebyshev_approximation(
                |t| (2.0 * PI * t).cos(),
                degree + 1,
                -k_shrunk,
                k_shrunk,
            ),
            Mod1Type::CosDiscrete => {
                if degree < 2 * (literal.k - 1) {
                    return Err(EvalError::invalid(format!(
                        "discrete cosine degree {degree} below 2(K - 1) = {}",
                        2 * (literal.k - 1)
                    )));
                }
                approximate_cos(
                    literal.k,
                    degree,
                    (-(literal.log_message_ratio as f64)).exp2(),
                    double_angle,
                )?
            }
        };

        let odd = literal.mod1_type == Mod1Type::SinContinuous;
        for (i, c) in coeffs.iter_mut().enumerate() {
            if (i & 1 == 1) != odd {
                *c = 0.0;
            } else {
                *c *= sqrt2pi;
            }
        }
        let interval = if odd { [-k, k] } else { interval };
        let mod1_poly = Polynomial::chebyshev(&coeffs, interval)?;

        let out = Self {
            level_q: literal.level_q,
            log_scale: literal.log_scale,
            mod1_type: literal.mod1_type,
            log_message_ratio: literal.log_message_ratio,
            k,
            double_angle,
            q_diff,
            sqrt2pi,
            mod1_poly,
            mod1_inv_poly,
            levels_per_rescale: params.levels_consumed_per_rescaling(),
        };
        let required = out.levels_per_rescale * out.depth();
        if required > out.level_q {
            return Err(EvalError::InsufficientLevel {
                operation: "mod1_parameters",
                level: out.level_q,
                required,
            });
        }
        debug!(
            mod1_type = ?out.mod1_type,
            degree = out.mod1_poly.degree(),
            double_angle,
            depth = out.depth(),
            "mod1 parameters"
        );
        Ok(out)
    }

    pub fn scaling_factor(&self) -> Scale {
        Scale::from_log2(self.log_scale as f64)
    }

    /// `2^double_angle`, the factor the cosine argument is divided by.
    pub fn interval_shrink_factor(&self) -> f64 {
        (self.double_angle as f64).exp2()
    }

    /// Number of rescales performed by the reduction, the normalization by
    /// `1/K` included.
    pub fn depth(&self) -> usize {
        1 + self.mod1_poly.depth()
            + self.double_angle
            + self.mod1_inv_poly.as_ref().map_or(0, Polynomial::depth)
    }

    /// Level of the output.
    pub fn output_level(&self) -> usize {
        self.level_q - self.levels_per_rescale * self.depth()
    }

    fn is_cosine(&self) -> bool {
        self.mod1_type != Mod1Type::SinContinuous
    }

    /// The reduction on a cleartext value, for reference.
    pub fn evaluate_plain(&self, x: f64) -> f64 {
        let mut u = x / self.k;
        if self.is_cosine() {
            u -= 0.25 / self.k;
        }
        let [_, b] = self.mod1_poly.interval;
        let mut y = self.mod1_poly.evaluate_real(u * b);
        let mut amplitude = self.sqrt2pi;
        for _ in 0..self.double_angle {
            amplitude *= amplitude;
            y = 2.0 * y * y - amplitude;
        }
        match &self.mod1_inv_poly {
            Some(inv) => inv.evaluate_real(y),
            None => y,
        }
    }
}

/// `(q_diff / 2π) · arcsin(x)` truncated to `degree`.
fn arcsine(degree: usize, q_diff: f64) -> EvalResult<Polynomial> {
    let mut coeffs = vec![0.0; degree + 1];
    coeffs[1] = INV_2PI * q_diff;
    for i in (3..=degree).step_by(2) {
        let f = i as f64;
        coeffs[i] = coeffs[i - 2] * (f - 2.0) * (f - 2.0) / (f * (f - 1.0));
    }
    Polynomial::monomial(&coeffs)
}

/// Even Chebyshev coefficients of `cos(2πy / 2^r)` in `u = y / K`, fitted by
/// least squares on `y ∈ (i - 1/4) ± dev` for every integer `i` of `[-K, K]`.
fn approximate_cos(
    k: usize,
    degree: usize,
    dev: f64,
    double_angle: usize,
) -> EvalResult<Vec<f64>> {
    let shrink = (double_angle as f64).exp2();
    let kf = k as f64;
    let terms = degree / 2 + 1;

    let mut rows = Vec::new();
    let mut targets = Vec::new();
    for i in -(k as i64) + 1..=k as i64 {
        let center = i as f64 - 0.25;
        for j in 0..DISCRETE_SAMPLES {
            let offset = (PI * (j as f64 + 0.5) / DISCRETE_SAMPLES as f64).cos();
            // the target is even, so only |y| is sampled
            let y = (center + dev * offset).abs();
            let theta = (y / kf).min(1.0).acos();
            rows.push((0..terms).map(|h| (2.0 * h as f64 * theta).cos()).collect());
            targets.push((2.0 * PI * y / shrink).cos());
        }
    }

    let even = least_squares(rows, targets)
        .ok_or_else(|| EvalError::invalid("discrete cosine fit is singular"))?;
    let mut coeffs = vec![0.0; degree + 1];
    for (h, c) in even.into_iter().enumerate() {
        coeffs[2 * h] = c;
    }
    Ok(coeffs)
}

/// Evaluates [`Mod1Parameters`] on ciphertexts.
#[derive(Debug)]
pub struct Mod1Evaluator<E> {
    poly_eval: PolynomialEvaluator<E>,
    params: Mod1Parameters,
}

impl<E: Arithmetic> Mod1Evaluator<E> {
    pub fn new(eval: E, params: Mod1Parameters) -> Self {
        Self {
            poly_eval: PolynomialEvaluator::new(eval),
            params,
        }
    }

    pub fn parameters(&self) -> &Mod1Parameters {
        &self.params
    }

    pub fn evaluator(&self) -> &E {
        self.poly_eval.evaluator()
    }

    pub fn shallow_copy(&self) -> Self {
        Self {
            poly_eval: self.poly_eval.shallow_copy(),
            params: self.params.clone(),
        }
    }

    /// Reduces `ct` modulo 1.
    ///
    /// `ct` must sit at `level_q` or above; higher levels are dropped. Its
    /// scale must not exceed `2^log_scale` times the modulus consumed by the
    /// normalization. The result sits at [`Mod1Parameters::output_level`] with the working scale
    /// `2^log_scale` and decodes to `q_diff · (x - round(x))`.
    #[instrument(skip_all, fields(level = ct.level(), mod1_type = ?self.params.mod1_type))]
    pub fn evaluate(&self, ct: &E::Ciphertext) -> EvalResult<E::Ciphertext> {
        let p = &self.params;
        let eval = self.poly_eval.evaluator();
        if ct.level() < p.level_q {
            return Err(EvalError::InsufficientLevel {
                operation: "mod1",
                level: ct.level(),
                required: p.level_q,
            });
        }
        let mut input = ct.clone();
        eval.drop_to_level(&mut input, p.level_q)?;

        // x / K at the working scale, the argument of the Chebyshev series
        let lcr = eval.levels_consumed_per_rescaling();
        let params = eval.parameters();
        let mut out = eval.new_ciphertext(
            1,
            p.level_q,
            p.scaling_factor() * params.rescale_factor(p.level_q),
        );
        eval.mul_then_add(&input, Operand::real(1.0 / p.k), &mut out)?;
        if p.is_cosine() {
            eval.add_assign(&mut out, Operand::real(-0.25 / p.k))?;
        }
        eval.rescale(&mut out)?;

        // scale before the double-angle rounds such that they end on the
        // working scale
        let poly_level = out.level() - lcr * p.mod1_poly.depth();
        let mut target = p.scaling_factor();
        for i in (0..p.double_angle).rev() {
            target = (target * params.rescale_factor(poly_level - lcr * i)).sqrt();
        }

        out = self.poly_eval.evaluate(&out, &p.mod1_poly, target)?;

        let mut amplitude = p.sqrt2pi;
        for _ in 0..p.double_angle {
            amplitude *= amplitude;
            out = eval.mul_relin(&out, Operand::Ciphertext(&out))?;
            out = eval.add(&out, Operand::Ciphertext(&out))?;
            eval.add_assign(&mut out, Operand::real(-amplitude))?;
            eval.rescale(&mut out)?;
        }

        if let Some(inv) = &p.mod1_inv_poly {
            out = self.poly_eval.evaluate(&out, inv, out.scale())?;
        }

        out.set_scale(p.scaling_factor());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn params() -> Parameters {
        let mut log_q = vec![55];
        log_q.extend(std::iter::repeat_n(45, 14));
        Parameters::builder()
            .log_n(10)
            .log_q(log_q)
            .build()
            .unwrap()
    }

    fn literal(mod1_type: Mod1Type) -> Mod1ParametersLiteral {
        let mut literal = Mod1ParametersLiteral::new(12, 45);
        literal.mod1_type = mod1_type;
        literal
    }

    #[test]
    fn q_diff_is_close_to_one() {
        let p = Mod1Parameters::new(&params(), &literal(Mod1Type::CosDiscrete)).unwrap();
        assert!((p.q_diff - 1.0).abs() < 1e-3);
        assert_eq!(p.depth(), 1 + 5 + 3);
        assert!(p.mod1_poly.is_even);
    }

    #[test]
    fn sine_ignores_double_angle() {
        let mut literal = literal(Mod1Type::SinContinuous);
        literal.k = 2;
        literal.mod1_degree = 31;
        let p = Mod1Parameters::new(&params(), &literal).unwrap();
        assert_eq!(p.double_angle, 0);
        assert!(p.mod1_poly.is_odd);
        assert_eq!(p.mod1_poly.interval, [-2.0, 2.0]);
    }

    #[test]
    fn discrete_cosine_requires_degree() {
        let mut literal = literal(Mod1Type::CosDiscrete);
        literal.mod1_degree = 20;
        assert!(matches!(
            Mod1Parameters::new(&params(), &literal),
            Err(EvalError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn depth_must_fit_below_level_q() {
        let mut literal = literal(Mod1Type::CosDiscrete);
        literal.level_q = 6;
        assert_eq!(
            Mod1Parameters::new(&params(), &literal),
            Err(EvalError::InsufficientLevel {
                operation: "mod1_parameters",
                level: 6,
                required: 9
            })
        );
    }

    #[test]
    fn arcsine_series_coefficients() {
        let p = arcsine(7, 1.0).unwrap();
        assert_abs_diff_eq!(p.coeffs[1].re, INV_2PI, epsilon = 1e-15);
        assert_abs_diff_eq!(p.coeffs[3].re, INV_2PI / 6.0, epsilon = 1e-15);
        assert_abs_diff_eq!(p.coeffs[5].re, INV_2PI * 3.0 / 40.0, epsilon = 1e-15);
    }

    #[test]
    fn plain_reduction_matches_the_fractional_part() {
        let e_max = 2f64.powi(-8);
        for mod1_type in [Mod1Type::CosDiscrete, Mod1Type::CosContinuous] {
            let p = Mod1Parameters::new(&params(), &literal(mod1_type)).unwrap();
            for i in [-15i32, -3, 0, 1, 7, 15] {
                for e in [-e_max, -e_max / 3.0, 0.0, e_max / 2.0, e_max] {
                    let x = i as f64 + e;
                    assert_abs_diff_eq!(p.evaluate_plain(x), p.q_diff * e, epsilon = 1e-6);
                }
            }
        }
    }

    #[test]
    fn arcsine_removes_the_sine_error() {
        let mut literal = literal(Mod1Type::CosDiscrete);
        literal.mod1_inv_degree = 7;
        let mut log_q = vec![55];
        log_q.extend(std::iter::repeat_n(45, 14));
        let params = Parameters::builder().log_n(10).log_q(log_q).build().unwrap();
        let p = Mod1Parameters::new(&params, &literal).unwrap();
        assert_eq!(p.sqrt2pi, 1.0);
        let e = 2f64.powi(-8);
        assert_abs_diff_eq!(p.evaluate_plain(5.0 + e), p.q_diff * e, epsilon = 1e-8);
    }
}
