use rand::{Rng, seq::SliceRandom};
use rand_distr::{Distribution, Normal, uniform::Uniform};

/// Samples `degree` uniform residues in `[0, modulus)`.
///
/// # Panics
///
/// Panics if `modulus == 0`.
pub fn uniform_coefficients<R: Rng + ?Sized>(
    degree: usize,
    modulus: u64,
    rng: &mut R,
) -> Vec<u64> {
    let distribution = Uniform::new(0, modulus).unwrap_or_else(|_| {
        panic!(
            "uniform_coefficients: invalid range [0, {modulus}), \
            modulus must be positive"
        )
    });
    (0..degree).map(|_| distribution.sample(rng)).collect()
}

/// Samples rounded Gaussian integers.
///
/// The result is signed so that one sample can be embedded into every RNS row
/// of a polynomial consistently.
///
/// # Panics
///
/// Panics if `std_dev` is not finite and positive.
pub fn gaussian_coefficients<R: Rng + ?Sized>(
    degree: usize,
    std_dev: f64,
    rng: &mut R,
) -> Vec<i64> {
    assert!(
        std_dev.is_finite() && std_dev > 0.0,
        "gaussian_coefficients: std_dev must be finite and positive"
    );
    let normal = Normal::new(0.0, std_dev)
        .expect("gaussian_coefficients: failed to create Normal distribution");
    (0..degree)
        .map(|_| normal.sample(rng).round() as i64)
        .collect()
}

/// Samples a ternary vector with coefficients in `{-1, 0, 1}`.
///
/// Exactly `hamming_weight` entries are non-zero.
///
/// # Panics
///
/// Panics if `hamming_weight > degree`.
pub fn ternary_coefficients<R: Rng + ?Sized>(
    degree: usize,
    hamming_weight: usize,
    rng: &mut R,
) -> Vec<i64> {
    assert!(
        hamming_weight <= degree,
        "ternary_coefficients: hamming_weight must be <= degree"
    );
    let mut out = vec![0i64; degree];
    let mut indices: Vec<usize> = (0..degree).collect();
    indices.shuffle(rng);
    for &idx in indices.iter().take(hamming_weight) {
        out[idx] = if rng.random_bool(0.5) { 1 } else { -1 };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{
        gaussian_coefficients, ternary_coefficients, uniform_coefficients,
    };
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn uniform_coefficients_stay_in_range() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let coeffs = uniform_coefficients(128, 17, &mut rng);
        assert_eq!(coeffs.len(), 128);
        assert!(coeffs.iter().all(|&c| c < 17));
    }

    #[test]
    #[should_panic(
        expected = "uniform_coefficients: invalid range [0, 0), modulus must be positive"
    )]
    fn uniform_coefficients_panics_on_zero_modulus() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let _ = uniform_coefficients(8, 0, &mut rng);
    }

    #[test]
    fn gaussian_coefficients_have_reasonable_mean_and_variance() {
        const DEGREE: usize = 16_384;
        let std_dev = 3.2;
        let mut rng = ChaCha20Rng::seed_from_u64(99);
        let coeffs = gaussian_coefficients(DEGREE, std_dev, &mut rng);

        let mean = coeffs.iter().map(|&x| x as f64).sum::<f64>() / DEGREE as f64;
        let variance = coeffs
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / DEGREE as f64;

        let expected_variance = std_dev * std_dev;
        assert!(mean.abs() <= 0.25, "mean too far from 0: {mean}");
        assert!(
            (variance - expected_variance).abs() <= expected_variance * 0.35,
            "variance {variance} too far from expected {expected_variance}"
        );
    }

    #[test]
    #[should_panic(
        expected = "gaussian_coefficients: std_dev must be finite and positive"
    )]
    fn gaussian_coefficients_panics_on_non_finite_std_dev() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let _ = gaussian_coefficients(8, f64::NAN, &mut rng);
    }

    #[test]
    fn ternary_coefficients_have_exact_hamming_weight() {
        let mut rng = ChaCha20Rng::seed_from_u64(123);
        let coeffs = ternary_coefficients(256, 31, &mut rng);
        assert_eq!(coeffs.iter().filter(|&&x| x != 0).count(), 31);
        assert!(coeffs.iter().all(|&x| (-1..=1).contains(&x)));
    }

    #[test]
    #[should_panic(
        expected = "ternary_coefficients: hamming_weight must be <= degree"
    )]
    fn ternary_coefficients_panics_on_oversized_hamming_weight() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let _ = ternary_coefficients(8, 9, &mut rng);
    }
}
