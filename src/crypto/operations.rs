//! Symmetric CKKS encryption and decryption.
//!
//! A fresh encryption of `m` at level `l` is `(c0, c1) = (-a*s + e + m, a)`
//! with `a` uniform over `Q_l` and `e` a rounded Gaussian. Decryption
//! evaluates `c0 + c1*s`.

use std::sync::Arc;

use rand::Rng;

use super::{Ciphertext, CkksError, CkksResult, Parameters, Plaintext};
use crate::keys::SecretKey;
use crate::math::gaussian_coefficients;

pub struct Encryptor {
    params: Arc<Parameters>,
    secret_key: SecretKey,
}

impl Encryptor {
    pub fn new(params: Arc<Parameters>, secret_key: &SecretKey) -> Self {
        Self {
            params,
            secret_key: secret_key.clone(),
        }
    }

    pub fn encrypt<R: Rng + ?Sized>(&self, plaintext: &Plaintext, rng: &mut R) -> CkksResult<Ciphertext> {
        let level = plaintext.level();
        if plaintext.poly.degree() != self.params.degree() {
            return Err(CkksError::DegreeMismatch {
                expected: self.params.degree(),
                actual: plaintext.poly.degree(),
            });
        }
        let view = self.params.ring_q().at_level(level)?;

        let a = view.sample_uniform(rng);
        let mut a_ntt = a.clone();
        view.ntt_assign(&mut a_ntt)?;
        let mut c0 = view.new_poly();
        view.mul_coeffs(&a_ntt, self.secret_key.ntt_q(), &mut c0)?;
        view.intt_assign(&mut c0)?;
        view.neg_assign(&mut c0)?;

        let e = gaussian_coefficients(view.degree(), self.params.error_std_dev(), rng);
        view.add_assign(&mut c0, &view.from_signed(&e)?)?;
        view.add_assign(&mut c0, &plaintext.poly)?;

        Ok(Ciphertext {
            c0,
            c1: a,
            scale: plaintext.scale,
            log_slots: plaintext.log_slots,
        })
    }
}

pub struct Decryptor {
    params: Arc<Parameters>,
    secret_key: SecretKey,
}

impl Decryptor {
    pub fn new(params: Arc<Parameters>, secret_key: &SecretKey) -> Self {
        Self {
            params,
            secret_key: secret_key.clone(),
        }
    }

    pub fn decrypt(&self, ciphertext: &Ciphertext) -> CkksResult<Plaintext> {
        let view = self.params.ring_q().at_level(ciphertext.level())?;
        let mut poly = ciphertext.c1.clone();
        view.ntt_assign(&mut poly)?;
        let mut product = view.new_poly();
        view.mul_coeffs(&poly, self.secret_key.ntt_q(), &mut product)?;
        view.intt_assign(&mut product)?;
        view.add_assign(&mut product, &ciphertext.c0)?;
        Ok(Plaintext {
            poly: product,
            scale: ciphertext.scale,
            log_slots: ciphertext.log_slots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ParametersLiteral;
    use crate::encoding::CkksEncoder;
    use crate::keys::KeyGenerator;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex64;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn encrypt_then_decrypt_recovers_the_message() {
        let params = Arc::new(
            Parameters::new(&ParametersLiteral {
                log_n: 5,
                log_q: vec![55, 40],
                log_p: vec![61],
                hamming_weight: 16,
                error_std_dev: 3.2,
                log_default_scale: 40,
            })
            .unwrap(),
        );
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let sk = KeyGenerator::new(params.clone()).gen_secret_key(&mut rng).unwrap();
        let encoder = CkksEncoder::new(params.ring_q().clone());
        let values: Vec<Complex64> = (0..16)
            .map(|k| Complex64::new((k as f64 / 16.0) - 0.5, 0.25))
            .collect();

        for level in [0, 1] {
            let pt = encoder.encode(&values, 4, level, params.default_scale()).unwrap();
            let ct = Encryptor::new(params.clone(), &sk).encrypt(&pt, &mut rng).unwrap();
            assert_eq!(ct.level(), level);
            let decrypted = Decryptor::new(params.clone(), &sk).decrypt(&ct).unwrap();
            let decoded = encoder.decode(&decrypted).unwrap();
            for (want, got) in values.iter().zip(&decoded) {
                assert_abs_diff_eq!(want.re, got.re, epsilon = 1e-6);
                assert_abs_diff_eq!(want.im, got.im, epsilon = 1e-6);
            }
        }
    }
}
