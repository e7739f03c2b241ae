//! Hybrid key-switching keys.
//!
//! The Q chain is split into gadget digits of `|P|` consecutive primes. A key
//! from `s_in` to `s` holds, for every digit `d`, a pair over `Q·P`
//!
//! ```text
//! b_d = -a_d * s + e_d + P * s_in * [rows of digit d]
//! ```
//!
//! where the gadget factor is `P` on the digit's own Q rows and zero on every
//! other row (including the P rows). All key polynomials are stored in NTT
//! form at full level.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};

use super::SecretKey;
use crate::crypto::{CkksError, CkksResult, Parameters};
use crate::math::gaussian_coefficients;
use crate::rings::{PolyQP, RingView, RnsPoly};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchingKeyDigit {
    pub b: PolyQP,
    pub a: PolyQP,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchingKey {
    digits: Vec<SwitchingKeyDigit>,
}

impl SwitchingKey {
    pub fn digits(&self) -> &[SwitchingKeyDigit] {
        &self.digits
    }
}

/// Read-only key material consumed by the evaluator.
#[derive(Debug, Clone, Default)]
pub struct EvaluationKeySet {
    relinearization: Option<SwitchingKey>,
    galois: HashMap<u64, SwitchingKey>,
}

impl EvaluationKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_relinearization_key(&mut self, key: SwitchingKey) {
        self.relinearization = Some(key);
    }

    pub fn insert_galois_key(&mut self, galois_element: u64, key: SwitchingKey) {
        self.galois.insert(galois_element, key);
    }

    pub fn relinearization_key(&self) -> Option<&SwitchingKey> {
        self.relinearization.as_ref()
    }

    pub fn galois_key(&self, galois_element: u64) -> Option<&SwitchingKey> {
        self.galois.get(&galois_element)
    }

    pub fn galois_elements(&self) -> Vec<u64> {
        let mut elements: Vec<u64> = self.galois.keys().copied().collect();
        elements.sort_unstable();
        elements
    }
}

/// Generates keys for one parameter set.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    params: Arc<Parameters>,
}

impl KeyGenerator {
    pub fn new(params: Arc<Parameters>) -> Self {
        Self { params }
    }

    pub fn gen_secret_key<R: Rng + ?Sized>(&self, rng: &mut R) -> CkksResult<SecretKey> {
        SecretKey::generate(&self.params, rng)
    }

    fn check_key(&self, sk: &SecretKey) -> CkksResult<()> {
        let expected = self.params.max_level();
        if sk.ntt_q().level() != expected || sk.ntt_q().degree() != self.params.degree() {
            return Err(CkksError::InvalidParameter {
                message: "secret key does not belong to these parameters".to_string(),
            });
        }
        Ok(())
    }

    /// `b = -a * s + e` with fresh uniform `a`, everything in NTT form.
    ///
    /// `error` holds the signed noise coefficients; the Q and P halves of one
    /// key element must embed the same vector.
    fn sample_rlwe<R: Rng + ?Sized>(
        &self,
        view: RingView<'_>,
        s: &RnsPoly,
        error: &[i64],
        rng: &mut R,
    ) -> CkksResult<(RnsPoly, RnsPoly)> {
        let a = view.sample_uniform(rng);
        let mut b = view.new_poly();
        view.mul_coeffs(&a, s, &mut b)?;
        view.neg_assign(&mut b)?;
        let mut e = view.from_signed(error)?;
        view.ntt_assign(&mut e)?;
        view.add_assign(&mut b, &e)?;
        Ok((b, a))
    }

    /// Key switching from `s_in` (NTT form over the full Q chain) to `sk`.
    pub fn gen_switching_key<R: Rng + ?Sized>(
        &self,
        s_in: &RnsPoly,
        sk: &SecretKey,
        rng: &mut R,
    ) -> CkksResult<SwitchingKey> {
        self.check_key(sk)?;
        let view_q = self.params.ring_q().view();
        let view_p = self.params.ring_p().view();
        let q_moduli = view_q.moduli();
        let p_moduli = view_p.moduli();
        if s_in.level() < view_q.level() || s_in.degree() != view_q.degree() {
            return Err(CkksError::LevelMismatch {
                expected: view_q.level(),
                actual: s_in.level(),
            });
        }

        let alpha = self.params.digit_size();
        let digit_count = self.params.digit_count(self.params.max_level());
        let mut digits = Vec::with_capacity(digit_count);
        for d in 0..digit_count {
            let error = gaussian_coefficients(view_q.degree(), self.params.error_std_dev(), rng);
            let (mut b_q, a_q) = self.sample_rlwe(view_q, sk.ntt_q(), &error, rng)?;
            let (b_p, a_p) = self.sample_rlwe(view_p, sk.ntt_p(), &error, rng)?;

            let end = ((d + 1) * alpha).min(q_moduli.len());
            for i in d * alpha..end {
                let qi = &q_moduli[i];
                let p_mod_qi = p_moduli
                    .iter()
                    .fold(1u64, |acc, p| qi.mul(acc, qi.reduce(p.value())));
                let s_row = s_in.row(i);
                for (b, &s) in b_q.row_mut(i).iter_mut().zip(s_row) {
                    *b = qi.add(*b, qi.mul(p_mod_qi, s));
                }
            }

            digits.push(SwitchingKeyDigit {
                b: PolyQP { q: b_q, p: b_p },
                a: PolyQP { q: a_q, p: a_p },
            });
        }
        Ok(SwitchingKey { digits })
    }

    /// Switching key from `s^2` to `s`.
    pub fn gen_relinearization_key<R: Rng + ?Sized>(
        &self,
        sk: &SecretKey,
        rng: &mut R,
    ) -> CkksResult<SwitchingKey> {
        self.check_key(sk)?;
        let view_q = self.params.ring_q().view();
        let mut s_squared = view_q.new_poly();
        view_q.mul_coeffs(sk.ntt_q(), sk.ntt_q(), &mut s_squared)?;
        self.gen_switching_key(&s_squared, sk, rng)
    }

    /// Switching key from `s(X^galois_element)` to `s`.
    pub fn gen_galois_key<R: Rng + ?Sized>(
        &self,
        sk: &SecretKey,
        galois_element: u64,
        rng: &mut R,
    ) -> CkksResult<SwitchingKey> {
        self.check_key(sk)?;
        let view_q = self.params.ring_q().view();
        let s = view_q.from_signed(sk.coefficients())?;
        let mut s_galois = view_q.new_poly();
        view_q.automorphism(&s, galois_element, &mut s_galois)?;
        view_q.ntt_assign(&mut s_galois)?;
        self.gen_switching_key(&s_galois, sk, rng)
    }

    /// Relinearization key plus one Galois key per requested element.
    pub fn gen_evaluation_keys<R: Rng + ?Sized>(
        &self,
        sk: &SecretKey,
        galois_elements: &[u64],
        rng: &mut R,
    ) -> CkksResult<EvaluationKeySet> {
        let mut keys = EvaluationKeySet::new();
        keys.set_relinearization_key(self.gen_relinearization_key(sk, rng)?);
        for &g in galois_elements {
            if keys.galois_key(g).is_none() {
                debug!(galois_element = g, "generating galois key");
                keys.insert_galois_key(g, self.gen_galois_key(sk, g, rng)?);
            }
        }
        info!(
            galois_keys = keys.galois.len(),
            digits = self.params.digit_count(self.params.max_level()),
            "generated evaluation keys"
        );
        Ok(keys)
    }
}
