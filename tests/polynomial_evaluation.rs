mod common;

use approx::assert_abs_diff_eq;
use common::{Harness, max_abs_error, uniform};
use heaan_poly_eval::he::{CoefficientGetter, PowerBasis, SlotCoefficientGetter};
use heaan_poly_eval::{
    Arithmetic, Basis, Element, EvalError, Polynomial, PolynomialEvaluator, PolynomialVector,
    RingType,
};
use num_complex::Complex64;

fn taylor_exp(degree: usize) -> Polynomial {
    let mut coeffs = vec![1.0];
    for i in 1..=degree {
        let prev = coeffs[i - 1];
        coeffs.push(prev / i as f64);
    }
    Polynomial::monomial(&coeffs).expect("taylor coefficients")
}

#[test]
fn taylor_exp_degree_seven() {
    let h = Harness::new(6);
    let scale = h.params.default_scale();
    let xs = uniform(h.slots(), -1.0, 1.0, 1);
    let ct = h.encrypt_real(&xs, 6, scale);

    let poly = taylor_exp(7);
    let pe = PolynomialEvaluator::new(h.eval.shallow_copy());
    let out = pe.evaluate(&ct, &poly, scale).expect("evaluate");

    assert_eq!(out.level(), 6 - 3);
    assert!(out.scale().in_delta(scale, 30));
    let want: Vec<f64> = xs.iter().map(|&x| poly.evaluate_real(x)).collect();
    let err = max_abs_error(&h.decrypt_real(&out), &want);
    let bits = h.params.log_default_scale() - h.params.log_n() - 2;
    assert!(err < 2f64.powi(-(bits as i32)), "error {err:e}");

    // the truncated series is close to exp itself
    let exp: Vec<f64> = xs.iter().map(|x| x.exp()).collect();
    assert!(max_abs_error(&h.decrypt_real(&out), &exp) < 1e-4);
}

#[test]
fn chebyshev_interpolant_after_change_of_basis() {
    let h = Harness::new(8);
    let scale = h.params.default_scale();
    let xs = uniform(h.slots(), -4.0, 4.0, 2);
    let ct = h.encrypt_real(&xs, 8, scale);

    let sigmoid = |x: f64| 1.0 / (1.0 + (-x).exp());
    let poly = Polynomial::approximate(sigmoid, [-4.0, 4.0], 15).expect("approximation");
    let pe = PolynomialEvaluator::new(h.eval.shallow_copy());
    let mapped = pe.change_of_basis(&ct, &poly).expect("change of basis");
    assert_eq!(mapped.level(), 7);
    let out = pe.evaluate(&mapped, &poly, scale).expect("evaluate");
    assert_eq!(out.level(), 7 - 4);

    let got = h.decrypt_real(&out);
    let want: Vec<f64> = xs.iter().map(|&x| poly.evaluate_real(x)).collect();
    assert!(max_abs_error(&got, &want) < 1e-8);
    let exact: Vec<f64> = xs.iter().map(|&x| sigmoid(x)).collect();
    assert!(max_abs_error(&got, &exact) < 1e-3);
}

/// Records the degrees whose coefficients were requested.
struct RecordingGetter {
    inner: SlotCoefficientGetter,
    requested: Vec<usize>,
}

impl CoefficientGetter for RecordingGetter {
    fn single(&mut self, p: &Polynomial, k: usize) -> Complex64 {
        self.requested.push(k);
        self.inner.single(p, k)
    }

    fn vector(&mut self, polys: &PolynomialVector, k: usize) -> Vec<Complex64> {
        self.requested.push(k);
        self.inner.vector(polys, k)
    }

    fn shallow_copy(&self) -> Self {
        Self {
            inner: self.inner.shallow_copy(),
            requested: Vec::new(),
        }
    }
}

#[test]
fn parity_skips_coefficients() {
    let h = Harness::new(6);
    let scale = h.params.default_scale();
    let xs = uniform(h.slots(), -1.0, 1.0, 3);
    let ct = h.encrypt_real(&xs, 6, scale);
    let pe = PolynomialEvaluator::new(h.eval.shallow_copy());

    let odd = Polynomial::monomial(&[0.0, 1.0, 0.0, -1.0 / 6.0, 0.0, 1.0 / 120.0, 0.0, -1.0 / 5040.0])
        .expect("odd polynomial");
    let even = Polynomial::monomial(&[1.0, 0.0, -0.5, 0.0, 1.0 / 24.0, 0.0, -1.0 / 720.0])
        .expect("even polynomial");
    assert!(odd.is_odd && even.is_even);

    for (poly, odd_only) in [(odd, true), (even, false)] {
        let mut getter = RecordingGetter {
            inner: SlotCoefficientGetter::new(h.slots()),
            requested: Vec::new(),
        };
        let out = pe
            .evaluate_vector(&ct, &poly.clone().into(), scale, &mut getter)
            .expect("evaluate");
        assert!(!getter.requested.is_empty());
        assert!(
            getter.requested.iter().all(|k| (k % 2 == 1) == odd_only),
            "requested {:?}",
            getter.requested
        );
        let want: Vec<f64> = xs.iter().map(|&x| poly.evaluate_real(x)).collect();
        assert!(max_abs_error(&h.decrypt_real(&out), &want) < 1e-9);
    }
}

#[test]
fn repeated_power_generation_costs_nothing() {
    let h = Harness::new(6);
    let xs = uniform(h.slots(), -1.0, 1.0, 9);
    let ct = h.encrypt_real(&xs, 6, h.params.default_scale());

    for basis in [Basis::Monomial, Basis::Chebyshev] {
        let eval = h.eval.shallow_copy();
        let mut pb = PowerBasis::new(ct.clone(), basis);
        pb.gen_power(13, false, &eval).expect("first generation");
        let powers = pb.powers();
        let x13 = h.decrypt_real(pb.get(13).expect("x^13"));
        let before = eval.counters();
        assert!(before.ring_operations() > 0);

        pb.gen_power(13, false, &eval).expect("second generation");
        assert_eq!(eval.counters().ring_operations(), before.ring_operations());
        assert_eq!(pb.powers(), powers);
        assert_eq!(h.decrypt_real(pb.get(13).expect("x^13")), x13);
    }
}

#[test]
fn power_basis_is_reused_across_polynomials() {
    let h = Harness::new(6);
    let scale = h.params.default_scale();
    let xs = uniform(h.slots(), -1.0, 1.0, 4);
    let ct = h.encrypt_real(&xs, 6, scale);
    let pe = PolynomialEvaluator::new(h.eval.shallow_copy());

    let p1: PolynomialVector = taylor_exp(7).into();
    let p2: PolynomialVector = Polynomial::monomial(&[0.5, -1.0, 0.25, 0.0, 0.125, 0.0, 0.0, 0.3])
        .expect("polynomial")
        .into();

    let mut pb = PowerBasis::new(ct.clone(), Basis::Monomial);
    let mut getter = SlotCoefficientGetter::new(h.slots());
    let start = pe.evaluator().counters();
    let out1 = pe
        .evaluate_from_power_basis(&mut pb, &p1, scale, &mut getter)
        .expect("first evaluation");
    let powers = pb.powers();
    let before = pe.evaluator().counters();

    let out2 = pe
        .evaluate_from_power_basis(&mut pb, &p2, scale, &mut getter)
        .expect("second evaluation");
    assert_eq!(pb.powers(), powers);
    let after = pe.evaluator().counters();
    // no powers are generated the second time
    assert!(
        after.relinearizations - before.relinearizations
            < before.relinearizations - start.relinearizations
    );

    let got1 = h.decrypt_real(&out1);
    let got2 = h.decrypt_real(&out2);
    for (i, &x) in xs.iter().enumerate() {
        assert_abs_diff_eq!(got1[i], p1.value[0].evaluate_real(x), epsilon = 1e-9);
        assert_abs_diff_eq!(got2[i], p2.value[0].evaluate_real(x), epsilon = 1e-9);
    }
}

#[test]
fn vector_polynomials_follow_the_slot_mapping() {
    let h = Harness::new(6);
    let scale = h.params.default_scale();
    let xs = uniform(h.slots(), -1.0, 1.0, 5);
    let ct = h.encrypt_real(&xs, 6, scale);
    let pe = PolynomialEvaluator::new(h.eval.shallow_copy());

    let a = Polynomial::monomial(&[0.0, 1.0, 0.5, 0.25]).expect("a");
    let b = Polynomial::monomial(&[1.0, -1.0, 0.0, 0.75]).expect("b");
    let mapping: Vec<usize> = (0..h.slots()).map(|i| i % 2).collect();
    let polys = PolynomialVector::new(vec![a.clone(), b.clone()], Some(mapping)).expect("vector");

    let mut getter = SlotCoefficientGetter::new(h.slots());
    let out = pe
        .evaluate_vector(&ct, &polys, scale, &mut getter)
        .expect("evaluate");
    let got = h.decrypt_real(&out);
    for (i, &x) in xs.iter().enumerate() {
        let want = if i % 2 == 0 { a.evaluate_real(x) } else { b.evaluate_real(x) };
        assert_abs_diff_eq!(got[i], want, epsilon = 1e-9);
    }
}

#[test]
fn lazy_relinearization_gives_the_same_result() {
    let h = Harness::new(6);
    let scale = h.params.default_scale();
    let xs = uniform(h.slots(), -1.0, 1.0, 6);
    let ct = h.encrypt_real(&xs, 6, scale);
    let pe = PolynomialEvaluator::new(h.eval.shallow_copy());

    let poly = taylor_exp(7).with_lazy(true);
    let out = pe.evaluate(&ct, &poly, scale).expect("evaluate");
    assert_eq!(out.degree(), 1);
    let want: Vec<f64> = xs.iter().map(|&x| poly.evaluate_real(x)).collect();
    assert!(max_abs_error(&h.decrypt_real(&out), &want) < 1e-9);
}

#[test]
fn conjugate_invariant_ring() {
    let h = Harness::with_ring(6, RingType::ConjugateInvariant);
    assert_eq!(h.slots(), 1024);
    let scale = h.params.default_scale();
    let xs = uniform(h.slots(), -1.0, 1.0, 7);
    let ct = h.encrypt_real(&xs, 6, scale);
    let pe = PolynomialEvaluator::new(h.eval.shallow_copy());

    let poly = taylor_exp(5);
    let out = pe.evaluate(&ct, &poly, scale).expect("evaluate");
    let want: Vec<f64> = xs.iter().map(|&x| poly.evaluate_real(x)).collect();
    assert!(max_abs_error(&h.decrypt_real(&out), &want) < 1e-9);
}

#[test]
fn insufficient_level_is_an_error() {
    let h = Harness::new(6);
    let scale = h.params.default_scale();
    let ct = h.encrypt_real(&[0.5], 2, scale);
    let pe = PolynomialEvaluator::new(h.eval.shallow_copy());
    let err = pe.evaluate(&ct, &taylor_exp(7), scale).unwrap_err();
    assert_eq!(
        err,
        EvalError::InsufficientLevel {
            operation: "evaluate_polynomial",
            level: 2,
            required: 3
        }
    );
}

#[test]
fn missing_base_power_is_an_error() {
    let h = Harness::new(6);
    let pe = PolynomialEvaluator::new(h.eval.shallow_copy());
    let mut pb = PowerBasis {
        value: Default::default(),
        basis: Basis::Monomial,
    };
    let mut getter = SlotCoefficientGetter::new(h.slots());
    let err = pe
        .evaluate_from_power_basis(
            &mut pb,
            &taylor_exp(3).into(),
            h.params.default_scale(),
            &mut getter,
        )
        .unwrap_err();
    assert_eq!(err, EvalError::MissingPowerBasis { power: 1 });
}

#[test]
fn shallow_copies_evaluate_independently() {
    let h = Harness::new(6);
    let scale = h.params.default_scale();
    let xs = uniform(h.slots(), -1.0, 1.0, 8);
    let ct = h.encrypt_real(&xs, 6, scale);
    let pe = PolynomialEvaluator::new(h.eval.shallow_copy());
    let copy = pe.shallow_copy();

    let poly = taylor_exp(7);
    let a = pe.evaluate(&ct, &poly, scale).expect("original");
    let b = copy.evaluate(&ct, &poly, scale).expect("copy");
    assert_eq!(copy.evaluator().counters(), pe.evaluator().counters());
    assert!(max_abs_error(&h.decrypt_real(&a), &h.decrypt_real(&b)) < 1e-9);
    assert_eq!(a.level(), b.level());
    assert!(Arithmetic::parameters(copy.evaluator()).max_level() == 6);
}
