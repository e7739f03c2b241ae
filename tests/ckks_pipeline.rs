use std::sync::Arc;

use approx::assert_abs_diff_eq;
use num_complex::Complex64;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use toy_ckks_bootstrap::crypto::{
    Decryptor, Encryptor, Evaluator, Parameters, ParametersLiteral, PrecisionStats,
};
use toy_ckks_bootstrap::encoding::CkksEncoder;
use toy_ckks_bootstrap::keys::KeyGenerator;

#[test]
fn add_multiply_rescale_and_rotate() {
    let params = Arc::new(
        Parameters::new(&ParametersLiteral {
            log_n: 6,
            log_q: vec![55, 40, 40],
            log_p: vec![61, 61],
            hamming_weight: 32,
            error_std_dev: 3.2,
            log_default_scale: 40,
        })
        .unwrap(),
    );
    let mut rng = ChaCha20Rng::seed_from_u64(42);
    let keygen = KeyGenerator::new(params.clone());
    let sk = keygen.gen_secret_key(&mut rng).unwrap();
    let keys = keygen
        .gen_evaluation_keys(
            &sk,
            &[params.galois_element(1), params.conjugation_galois_element()],
            &mut rng,
        )
        .unwrap();
    let evaluator = Evaluator::new(params.clone(), Arc::new(keys));
    let encoder = CkksEncoder::new(params.ring_q().clone());
    let encryptor = Encryptor::new(params.clone(), &sk);
    let decryptor = Decryptor::new(params.clone(), &sk);

    let log_slots = 3;
    let values1: Vec<Complex64> = (1..=8).map(|k| Complex64::new(k as f64 / 8.0, 0.1)).collect();
    let values2: Vec<Complex64> = (1..=8).map(|k| Complex64::new(0.5, -(k as f64) / 16.0)).collect();
    let encrypt = |values: &[Complex64], rng: &mut ChaCha20Rng| {
        let pt = encoder
            .encode(values, log_slots, params.max_level(), params.default_scale())
            .unwrap();
        encryptor.encrypt(&pt, rng).unwrap()
    };
    let ct1 = encrypt(&values1, &mut rng);
    let ct2 = encrypt(&values2, &mut rng);
    let decrypt = |ct| encoder.decode(&decryptor.decrypt(ct).unwrap()).unwrap();

    let sum = evaluator.add(&ct1, &ct2).unwrap();
    let want: Vec<Complex64> = values1.iter().zip(&values2).map(|(a, b)| a + b).collect();
    assert!(PrecisionStats::new(&want, &decrypt(&sum)).avg() > 25.0);

    let product = evaluator
        .rescale(&evaluator.mul_relin(&ct1, &ct2).unwrap())
        .unwrap();
    assert_eq!(product.level(), params.max_level() - 1);
    let want: Vec<Complex64> = values1.iter().zip(&values2).map(|(a, b)| a * b).collect();
    assert!(PrecisionStats::new(&want, &decrypt(&product)).avg() > 20.0);

    let rotated = evaluator.rotate(&ct1, 1).unwrap();
    let got = decrypt(&rotated);
    for (k, value) in got.iter().enumerate() {
        assert_abs_diff_eq!(value.re, values1[(k + 1) % 8].re, epsilon = 1e-6);
        assert_abs_diff_eq!(value.im, values1[(k + 1) % 8].im, epsilon = 1e-6);
    }

    let conjugated = evaluator.conjugate(&ct2).unwrap();
    let want: Vec<Complex64> = values2.iter().map(Complex64::conj).collect();
    assert!(PrecisionStats::new(&want, &decrypt(&conjugated)).avg() > 25.0);
}
