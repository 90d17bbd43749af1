#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use heaan_poly_eval::backends::slots::{SlotEncoder, SlotEncryptor, SlotEvaluator};
use heaan_poly_eval::{Element, Parameters, Polynomial, PolynomialEvaluator};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _dhat = dhat::Profiler::new_heap();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // log_n = 12, six 45-bit levels above a 55-bit base modulus
    let mut log_q = vec![55];
    log_q.extend(std::iter::repeat_n(45, 6));
    let params = Arc::new(
        Parameters::builder()
            .log_n(12)
            .log_q(log_q)
            .log_p(vec![61, 61])
            .build()
            .expect("Failed to create parameters"),
    );
    println!(
        "log_n = {}, max level = {}, slots = {}, default scale = 2^{}",
        params.log_n(),
        params.max_level(),
        params.max_slots(),
        params.log_default_scale()
    );

    let mut rng = ChaCha20Rng::seed_from_u64(123);
    let values: Vec<f64> = (0..params.max_slots())
        .map(|_| rng.random_range(-1.0..1.0))
        .collect();

    let encoder = SlotEncoder::new(params.clone());
    let encryptor = SlotEncryptor::new(params.clone(), 1);
    let pt = encoder
        .encode_real(&values, params.max_level(), params.default_scale())
        .expect("Encoding failed");
    let ct = encryptor.encrypt(&pt);

    // exp(x) ≈ Σ x^k / k!, k <= 7
    let mut coeffs = vec![1.0];
    for k in 1..=7 {
        coeffs.push(coeffs[k - 1] / k as f64);
    }
    let poly = Polynomial::monomial(&coeffs).expect("Failed to create polynomial");

    let pe = PolynomialEvaluator::new(SlotEvaluator::new(params.clone(), 2));
    let out = pe
        .evaluate(&ct, &poly, params.default_scale())
        .expect("Evaluation failed");
    println!(
        "output level {} (consumed {}), scale 2^{:.4}",
        out.level(),
        ct.level() - out.level(),
        out.scale().log2()
    );

    let decoded = encoder.decode(&encryptor.decrypt(&out));
    let max_err = values
        .iter()
        .zip(&decoded)
        .map(|(x, y)| (x.exp() - y.re).abs())
        .fold(0.0, f64::max);
    let max_eval_err = values
        .iter()
        .zip(&decoded)
        .map(|(&x, y)| (poly.evaluate_real(x) - y.re).abs())
        .fold(0.0, f64::max);
    println!("max |exp(x) - out| = {max_err:.3e}");
    println!(
        "max |p(x) - out| = {max_eval_err:.3e} (2^{:.1})",
        max_eval_err.log2()
    );

    let counters = pe.evaluator().counters();
    println!(
        "multiplications = {}, relinearizations = {}, rescales = {}",
        counters.multiplications, counters.relinearizations, counters.rescales
    );
}
